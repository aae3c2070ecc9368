pub mod summary;

pub use summary::{new_session_id, write_summary, BatchSummary, SlotReport, SlotStatus};
