#![deny(missing_docs)]
//! Cryptographic primitives for the dead man's switch release pipeline.
//!
//! This crate has no knowledge of switches, watchers, or the substrate -
//! it is the leaf-to-root chain of cryptographic operations described by
//! the release pipeline: [`field`] and [`shamir`] implement authenticated
//! threshold secret sharing over GF(256); [`kdf`] derives the hierarchy of
//! per-switch, per-purpose, and per-fragment keys from a single password;
//! [`aead`] seals the payload; [`schnorr`] signs heartbeats and release
//! records; [`sealed_box`] encrypts a share to a specific watcher or
//! recipient's public key.
//!
//! None of these modules perform I/O or know about wire formats - that is
//! `switch-types`'s job. Keeping this crate free of async runtimes, HTTP,
//! and persistence means its crypto can be fuzzed, benchmarked, and
//! audited in isolation.

pub mod aead;
pub mod field;
pub mod kdf;
pub mod schnorr;
pub mod sealed_box;
pub mod shamir;
