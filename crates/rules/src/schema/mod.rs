//! Rule model types with serde (de)serialization.
//!
//! - `Condition`: the boolean tree evaluated against record fields
//! - `Rule` / `RuleDraft`: persisted rule and its client-supplied fields
//! - `Trigger`: which record lifecycle events make a rule eligible

mod condition;
mod rule;

pub use condition::*;
pub use rule::*;
