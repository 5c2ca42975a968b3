pub mod ocr_client;
pub mod visa_api_client;

pub use ocr_client::OcrClient;
pub use visa_api_client::VisaApiClient;
