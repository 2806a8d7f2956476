//! Utility modules.

pub mod file;
pub mod retry;
pub mod text;

pub use file::{calculate_file_checksum, collect_pdfs, is_pdf_file, source_name, text_path_for};
pub use retry::{RetryConfig, RetryResult, Retryable, with_retry};
pub use text::{clean, preview};
