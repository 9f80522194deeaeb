//! Testing infrastructure for correctness verification
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use quarry::testing::prelude::*;
//!
//! index.flush(request)?;
//! let violations = check_all_invariants(&index, &default_invariants());
//! assert!(violations.is_empty());
//! ```
//!
//! # Invariants
//!
//! - **UniquePrimaryPerUri**: one primary document per URI
//! - **UniqueSecondaryPerUri**: one secondary document per URI
//! - **NoOrphanedChildren**: removed parents take their children with them
//! - **SecondaryOnlyMutable**: secondary documents hold only mutable properties

pub mod invariants;

pub use invariants::{
    check_all_invariants, default_invariants, Invariant, NoOrphanedChildren, SecondaryOnlyMutable,
    UniquePrimaryPerUri, UniqueSecondaryPerUri, Violation,
};

/// Prelude for easy imports
pub mod prelude {
    pub use super::invariants::{
        check_all_invariants, default_invariants, Invariant, NoOrphanedChildren, Violation,
    };
}
