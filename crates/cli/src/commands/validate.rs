//! Check an order payload without publishing it.
//!
//! ```bash
//! orderflow-cli validate fixtures/order.json
//! ```

use std::path::Path;

use orderflow_core::{Order, ValidationError, validate};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("not an order document: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{} rule(s) violated", .0.violations.len())]
    Invalid(#[from] ValidationError),
}

/// Decode and validate the order in `file`.
///
/// Prints one line per violated rule.
///
/// # Errors
///
/// Returns `CheckError` if the file is unreadable, is not an order, or breaks
/// any admission rule.
pub fn run(file: &Path) -> Result<(), CheckError> {
    let raw = std::fs::read(file).map_err(|source| CheckError::Read {
        path: file.display().to_string(),
        source,
    })?;

    match check(&raw) {
        Ok(order) => {
            #[allow(clippy::print_stdout)]
            {
                println!("{}: ok ({} item(s))", order.order_uid, order.items.len());
            }
            Ok(())
        }
        Err(CheckError::Invalid(err)) => {
            #[allow(clippy::print_stdout)]
            {
                for violation in &err.violations {
                    println!("  {violation}");
                }
            }
            Err(CheckError::Invalid(err))
        }
        Err(err) => Err(err),
    }
}

fn check(raw: &[u8]) -> Result<Order, CheckError> {
    let order: Order = serde_json::from_slice(raw)?;
    validate(&order)?;
    Ok(order)
}
