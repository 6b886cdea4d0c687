//! # IO Module
//!
//! Adapter layer between the apps' UI code and the domain services.
//!
//! ## Key Responsibilities
//!
//! - **Request handling**: turning `shared` request DTOs into domain calls
//! - **Response mapping**: converting domain results and observable state to
//!   `shared` DTOs
//! - **Error translation**: surfacing failures as user-facing messages

pub mod mappers;
pub mod session_api;
