//! quizmark - quiz answer-script OCR and graded result packs.
//!
//! Core library: the OCR engine cascade, page-to-student segmentation and
//! the composite PDF pack builder. The `quizmark` binary wraps it in a CLI.

// Model types use `from_str` methods that return Option<Self>,
// not Result<Self, Error> as std::str::FromStr requires.
#![allow(clippy::should_implement_trait)]

pub mod config;
pub mod http_client;
pub mod models;
pub mod ocr;
pub mod pack;
pub mod rate_limit;
pub mod repository;
pub mod segmentation;
pub mod storage;
pub mod text;
