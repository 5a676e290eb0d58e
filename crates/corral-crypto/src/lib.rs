//! Corral Crypto: digest and comparison primitives shared by the
//! coordinator and the join client.

pub mod fingerprint;
