// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

mod report;
mod syntax;
mod validator;

pub use report::{ElementRef, PolicyError, ValidationReport};
pub use syntax::{type_matches, DataType, DefaultSyntaxRegistry, SyntaxRegistry};
pub use validator::{validate_partial, validate_runnable};
