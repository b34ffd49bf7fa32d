//! External Infrastructure - HTTP adapters for the billing ports
//!
//! This crate connects the billing domain to the two systems it does not own:
//!
//! - [`AirtableLedgerAdapter`]: reads billing records and writes outcomes
//! - [`StripeProcessorAdapter`]: lists cards, charges them and builds invoices
//!
//! Both adapters share one pooled `reqwest` client setup with a bounded
//! per-request timeout, and translate HTTP failures into
//! [`core_kernel::PortError`]:
//!
//! | Status      | Error                |
//! |-------------|----------------------|
//! | 401, 403    | `Unauthorized`       |
//! | 402         | `Rejected`           |
//! | 404         | `NotFound`           |
//! | 400, 422    | `Validation`         |
//! | 429         | `RateLimited`        |
//! | 5xx         | `ServiceUnavailable` |
//! | timeout     | `Timeout`            |
//! | transport   | `Connection`         |

mod http;
pub mod airtable;
pub mod stripe;

pub use airtable::AirtableLedgerAdapter;
pub use stripe::StripeProcessorAdapter;
