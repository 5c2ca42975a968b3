pub mod catalog;
pub mod file_validation;
pub mod memory_store;
pub mod ocr_reconciler;
pub mod persistence;
pub mod submission;
pub mod warn_writer;

pub use catalog::{CatalogSource, DocumentCatalog};
pub use file_validation::{validate_file, FileValidationOptions};
pub use memory_store::InMemoryApplicationStore;
pub use ocr_reconciler::{OcrReconciler, PassportExtractor};
pub use persistence::{ApplicationStore, StepPayload, StepPersistenceGateway};
pub use submission::SubmissionGate;
pub use warn_writer::WarnWriter;
