pub mod application;
pub mod document;
pub mod loaders;
pub mod ocr;
pub mod passport;
pub mod progress;

pub use application::{ApplicantInfo, DocumentKey, ProcessingMode, VisaApplicationAggregate};
pub use document::{DocumentRequirement, Side};
pub use loaders::{load_all_manifests, load_manifest, IntakeManifest};
pub use ocr::OcrResult;
pub use passport::{PassportData, PassportRecord};
pub use progress::{FileRef, LocalFile, TravellerProgress, UploadedSide};
