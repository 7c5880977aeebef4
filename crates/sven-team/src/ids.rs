// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! `sess_YYYYMMDD_xxxxxx` id generation (spec §3), mirroring
//! `sven_scheduler::ids`'s `task_*` shape. A session id is also its
//! coordinator thread's root `ThreadId`, so it must contain no dots.

use chrono::Utc;
use rand::Rng;

const SUFFIX_LEN: usize = 6;
const SUFFIX_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

pub fn new_session_id() -> String {
    new_session_id_at(Utc::now())
}

pub fn new_session_id_at(now: chrono::DateTime<Utc>) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..SUFFIX_ALPHABET.len());
            SUFFIX_ALPHABET[idx] as char
        })
        .collect();
    format!("sess_{}_{}", now.format("%Y%m%d"), suffix)
}
