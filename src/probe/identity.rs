use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use uuid::Uuid;

use crate::config::IdentityConfig;
use crate::probe::types::Identity;

pub const PASSWORD_LENGTH: usize = 14;

const UPPER: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
const LOWER: &[u8] = b"abcdefghijkmnopqrstuvwxyz";
const DIGITS: &[u8] = b"23456789";
const SYMBOLS: &[u8] = b"!@#$%^&*()-_=+";

const FIRST_NAMES: &[&str] = &[
    "Alice", "Bruno", "Chloe", "Dmitri", "Elena", "Farid", "Grace", "Hiro", "Ines", "Jonas",
    "Kira", "Luca", "Maya", "Nikolai", "Olivia", "Pavel", "Quinn", "Rosa", "Sami", "Tessa",
];

const LAST_NAMES: &[&str] = &[
    "Anderson", "Barros", "Costa", "Dubois", "Eriksen", "Fischer", "Garcia", "Hansen", "Ivanova",
    "Jensen", "Kowalski", "Lambert", "Moreau", "Novak", "Okafor", "Petrov", "Quinlan", "Rossi",
    "Schmidt", "Tanaka",
];

/// Issues fresh identities for one run. Emails are never reused within the
/// lifetime of a generator.
pub struct IdentityGenerator {
    rng: StdRng,
    email_prefix: String,
    email_domain: String,
    issued: HashSet<String>,
}

impl IdentityGenerator {
    pub fn new(config: &IdentityConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    pub fn with_rng(config: &IdentityConfig, rng: StdRng) -> Self {
        Self {
            rng,
            email_prefix: config.email_prefix.clone(),
            email_domain: config.email_domain.clone(),
            issued: HashSet::new(),
        }
    }

    pub fn next_identity(&mut self) -> Identity {
        let email = loop {
            let token = Uuid::new_v4().simple().to_string();
            let candidate = format!("{}+{}@{}", self.email_prefix, &token[..10], self.email_domain);
            if self.issued.insert(candidate.clone()) {
                break candidate;
            }
        };

        Identity {
            display_name: self.display_name(),
            email,
            password: generate_password(&mut self.rng, PASSWORD_LENGTH),
        }
    }

    fn display_name(&mut self) -> String {
        let first = FIRST_NAMES.choose(&mut self.rng).copied().unwrap_or("Test");
        let last = LAST_NAMES.choose(&mut self.rng).copied().unwrap_or("User");
        format!("{first} {last}")
    }
}

/// Random password with at least one upper-case letter, lower-case letter,
/// digit and symbol. `length` below 4 is raised to 4.
pub fn generate_password<R: Rng>(rng: &mut R, length: usize) -> String {
    let classes = [UPPER, LOWER, DIGITS, SYMBOLS];
    let all: Vec<u8> = classes.concat();

    let mut chars: Vec<u8> = classes
        .iter()
        .map(|class| class[rng.gen_range(0..class.len())])
        .collect();
    while chars.len() < length {
        chars.push(all[rng.gen_range(0..all.len())]);
    }
    chars.shuffle(rng);

    chars.into_iter().map(char::from).collect()
}
