pub mod config;
pub mod eligibility;
pub mod error;
pub mod leader;
pub mod worker;

pub use config::ReadaheadConfig;
pub use eligibility::{should_add_to_readahead, track_for_readahead};
pub use error::{ReadaheadError, Result};
pub use leader::{become_leader, local_owner, release_leader, Lease};
pub use worker::{perform_readahead, run_pass, PassSummary};
