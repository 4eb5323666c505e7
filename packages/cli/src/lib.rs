// ABOUTME: Library half of the solitary CLI: config layering and result rendering
// ABOUTME: Kept out of the binary so both can be unit tested without a Docker daemon

pub mod config;
pub mod output;
