//! Deterministic synthetic surrogates.
//!
//! SYNTHETIC mode replaces an entity with a plausible value of the same
//! type. The generator is seeded from
//! `SHA-256(session_id ‖ entity_type ‖ normalized_surface)`, so repeated
//! calls within a session reproduce the same surrogate while different
//! sessions diverge.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

use crate::entity;

const FIRST_NAMES: &[&str] = &[
    "Alex", "Casey", "Dana", "Elliot", "Frankie", "Harper", "Jordan", "Kendall", "Logan",
    "Morgan", "Parker", "Quinn", "Riley", "Rowan", "Sage", "Taylor",
];

const LAST_NAMES: &[&str] = &[
    "Abbott", "Barnes", "Calloway", "Draper", "Ellison", "Foster", "Granger", "Holloway",
    "Iverson", "Jennings", "Kessler", "Lockhart", "Mercer", "Norwood", "Osborne", "Prescott",
];

const EMAIL_DOMAINS: &[&str] = &["example.com", "example.org", "mail.example.net"];

const WORDS: &[&str] = &[
    "amber", "cobalt", "delta", "ember", "falcon", "harbor", "indigo", "juniper", "meadow",
    "onyx", "quartz", "sierra", "tundra", "willow",
];

const DNA_BASES: &[u8] = b"ATCG";

const ALNUM: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Field separator for the seed preimage, so that
/// (`"ab"`, `"c"`) and (`"a"`, `"bc"`) seed differently.
const SEED_SEPARATOR: [u8; 1] = [0x1f];

/// Produces a surrogate of the same entity type as the input.
pub(super) fn surrogate(session_id: &str, entity_type: &str, normalized_surface: &str) -> String {
    let mut rng = seeded_rng(session_id, entity_type, normalized_surface);

    match entity_type {
        entity::PERSON => format!(
            "{} {}",
            pick(&mut rng, FIRST_NAMES),
            pick(&mut rng, LAST_NAMES)
        ),
        entity::EMAIL_ADDRESS => format!(
            "{}.{}{}@{}",
            pick(&mut rng, FIRST_NAMES).to_lowercase(),
            pick(&mut rng, LAST_NAMES).to_lowercase(),
            rng.gen_range(1..100),
            pick(&mut rng, EMAIL_DOMAINS)
        ),
        entity::PHONE_NUMBER => format!(
            "({}) {:03}-{:04}",
            rng.gen_range(200..990),
            rng.gen_range(200..999),
            rng.gen_range(0..10_000)
        ),
        entity::IP_ADDRESS => format!(
            "10.{}.{}.{}",
            rng.gen_range(0..256),
            rng.gen_range(0..256),
            rng.gen_range(1..255)
        ),
        entity::DATE_TIME => format!(
            "{:02}/{:02}/{}",
            rng.gen_range(1..13),
            rng.gen_range(1..29),
            rng.gen_range(1950..2015)
        ),
        entity::MRN => format!("MRN-{:08}", rng.gen_range(10_000_000u64..100_000_000)),
        entity::PROTOCOL_ID => {
            let letters: String = (0..3)
                .map(|_| char::from(rng.gen_range(b'A'..=b'Z')))
                .collect();
            format!("{}-{:03}", letters, rng.gen_range(0..1000))
        },
        entity::LOT_NUMBER => format!(
            "LOT-{}{}{:02}",
            char::from(rng.gen_range(b'A'..=b'Z')),
            char::from(rng.gen_range(b'A'..=b'Z')),
            rng.gen_range(0..100)
        ),
        entity::GENE_SEQUENCE => {
            let length = normalized_surface.len().max(10);
            (0..length)
                .map(|_| char::from(*pick(&mut rng, DNA_BASES)))
                .collect()
        },
        entity::CHEMICAL_CAS => format!(
            "{:05}-{:02}-{}",
            rng.gen_range(10_000..100_000),
            rng.gen_range(10..100),
            rng.gen_range(0..10)
        ),
        entity::SECRET_KEY => {
            let suffix: String = (0..24).map(|_| char::from(*pick(&mut rng, ALNUM))).collect();
            format!("sk-{suffix}")
        },
        entity::US_SSN => format!(
            "{:03}-{:02}-{:04}",
            rng.gen_range(100..600),
            rng.gen_range(1..100),
            rng.gen_range(1..10_000)
        ),
        entity::CREDIT_CARD => synthetic_card(&mut rng),
        entity::URL => format!("https://www.{}.example.com/", pick(&mut rng, WORDS)),
        _ => (*pick(&mut rng, WORDS)).to_string(),
    }
}

fn seeded_rng(session_id: &str, entity_type: &str, normalized_surface: &str) -> StdRng {
    let mut hasher = Sha256::new();
    hasher.update(session_id.as_bytes());
    hasher.update(SEED_SEPARATOR);
    hasher.update(entity_type.as_bytes());
    hasher.update(SEED_SEPARATOR);
    hasher.update(normalized_surface.as_bytes());
    let seed: [u8; 32] = hasher.finalize().into();
    StdRng::from_seed(seed)
}

fn pick<'a, T>(rng: &mut StdRng, items: &'a [T]) -> &'a T {
    items.choose(rng).expect("surrogate pools are non-empty")
}

/// A 16-digit card number with a valid Luhn check digit, from a test IIN.
fn synthetic_card(rng: &mut StdRng) -> String {
    let mut digits: Vec<u32> = vec![4, 0, 0, 0];
    for _ in 0..11 {
        digits.push(rng.gen_range(0..10));
    }

    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            // The check digit will land at even parity position 0.
            if i % 2 == 0 {
                let doubled = d * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                d
            }
        })
        .sum();
    let check = (10 - (sum % 10)) % 10;
    digits.push(check);

    digits.iter().map(ToString::to_string).collect()
}
