mod link;

pub use link::{recency_cutoff, ApprovalUpdate, Link, NewLink, RECENCY_WINDOW_HOURS};
