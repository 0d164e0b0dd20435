//! Audit and reshape OpenStreetMap XML exports into line-delimited JSON
//! documents for bulk loading into MongoDB, one streaming pass at a time.

pub mod data;
pub mod errors;
pub mod etl;
pub mod keys;
pub mod mongo;
pub mod rules;
