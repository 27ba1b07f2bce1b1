//! Event ingestion: webhook + broker entry points, HMAC verification,
//! normalisation into [`stores::model::Event`], and the bounded queue
//! that decouples receipt from the durability write.

pub mod hmac_verify;
pub mod normalize;
pub mod pipeline;
