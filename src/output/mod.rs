//! Output module for frontier reports
//!
//! This module handles:
//! - Collecting queue and disposition statistics
//! - Printing reports and per-queue summaries to the terminal

pub mod stats;

pub use stats::{
    print_checkpoint, print_queue_summaries, print_report, FrontierReport, QueueSummary,
};
