pub mod channels;
pub mod cleanup;
pub mod link;
pub mod report;
