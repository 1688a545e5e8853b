// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # fieldlink Integration Tests
//!
//! Shared test utilities and integration tests for the fieldlink client.
//!
//! ## Module Structure
//!
//! - [`common`]: Shared test utilities
//!   - `mocks`: A scriptable in-memory server network behind the
//!     transport seam
//!   - `builders`: Fast configurations and object helpers
//!
//! ## Running Tests
//!
//! ```bash
//! # Run all integration tests
//! cargo test -p fieldlink-tests
//!
//! # Run specific test suite
//! cargo test -p fieldlink-tests --test integration_failover
//! cargo test -p fieldlink-tests --test integration_registry
//! cargo test -p fieldlink-tests --test integration_security
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod common;

/// Re-export commonly used items for convenience.
pub mod prelude {
    pub use crate::common::builders::*;
    pub use crate::common::mocks::*;
}
