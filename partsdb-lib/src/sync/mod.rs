//! Incremental reconciliation of the local catalog against the server's category index.
//!
//! Every `(category, subcategory)` key of the index is classified against the local
//! store:
//!
//! | Local state                               | Transition    | Action                                   |
//! |-------------------------------------------|---------------|------------------------------------------|
//! | absent                                    | `New`         | fetch components, then stock             |
//! | `datahash` or `sourcename` differ         | `Changed`     | replace category and components          |
//! | only `stockhash` differs                  | `StockOnly`   | update stock in place                    |
//! | both hashes match                         | `NoOp`        | nothing                                  |
//! | present locally, absent from the index    | `Excessive`   | delete category and components           |
//!
//! Actions for indexed keys run concurrently. The excessive sweep starts only once all of
//! them have resolved, and it only ever considers keys missing from the index, so a
//! category whose action failed keeps its previously synced data.

mod index;
mod plan;
mod reconciler;

pub use index::{CategoryIndex, IndexEntry};
pub use plan::{PlannedAction, SyncPlan, Transition, classify, plan};
pub use reconciler::{CategoryOutcome, CategoryReport, CategorySource, Reconciler, StatusBoard, SyncProgress, SyncReport};
