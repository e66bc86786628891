//! Control module - everything that is not the framed main output.
//!
//! Currently the diagnostic side-channel used by the raw mirror convention.
//!
//! # Example
//!
//! ```
//! use pipe_rpc::control::{diagnostic_line, Diagnostics};
//!
//! assert_eq!(diagnostic_line("invalid JSON"), "error: invalid JSON\n");
//! let diagnostics = Diagnostics::stderr();
//! assert!(diagnostics.is_enabled());
//! ```

mod diagnostics;

pub use diagnostics::{diagnostic_line, Diagnostics, DIAGNOSTIC_PREFIX};
