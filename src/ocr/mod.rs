//! OCR and text extraction.
//!
//! Extracts per-page text from scanned answer-script PDFs using:
//! - pdftotext (Poppler) for born-digital PDFs
//! - Google Cloud Vision document OCR over the whole PDF
//! - an OpenAI-compatible vision model, one page image at a time
//! - Google Gemini, one page image at a time
//! - Google Cloud Vision image OCR over preprocessed page variants
//! - Tesseract as the local last resort
//!
//! ## Cascade
//!
//! [`OcrCascade`] tries the engines in that order (or one explicit engine
//! followed by Tesseract) and keeps the first result with meaningful text.
//! Model-based engines receive a [`NamingContext`] so the first page of each
//! student block starts with a `Name:` / `Roll:` header.

mod api_backend;
mod backend;
mod cascade;
mod document;
mod embedded;
mod gemini;
mod llm_vision;
mod naming;
mod pdf_utils;
mod preprocess;
mod tesseract;
mod vision;

pub use backend::{OcrEngine, OcrError, OcrOutput, OcrStrategy};
pub use cascade::{Attempt, AttemptOutcome, CascadeReport, EngineMode, OcrCascade};
pub use document::DocumentOcrStrategy;
pub use embedded::EmbeddedTextStrategy;
pub use gemini::GeminiStrategy;
pub use llm_vision::LlmVisionStrategy;
pub use naming::{NamingContext, NamingLock, PageRole};
pub use pdf_utils::{check_binary, count_pages, PdfSource};
pub use preprocess::{generate_variants, VariantFile, VariantKind, VariantPlan};
pub use tesseract::TesseractStrategy;
pub use vision::VisionVariantStrategy;
