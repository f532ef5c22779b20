//! Client for the Commitfest app and the mailing list archive.
//!
//! Neither site offers an API for what patchbot needs, so pages are fetched
//! and scraped line by line. The scraping lives in [`scrape`] as pure
//! functions; [`CommitfestClient`] adds HTTP, pacing and URL handling.

pub mod client;
pub mod error;
pub mod scrape;

pub use client::CommitfestClient;
pub use error::{CommitfestError, CommitfestResult};
