use rand::Rng;
use std::time::{SystemTime, UNIX_EPOCH};

/// Exclusive upper bound for issued verification codes.
pub const VERIFICATION_CODE_LIMIT: u64 = 100_000;

pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> u64;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or_default()
    }
}

/// Source of the values handed out when an application registers.
pub trait ChallengeSource: Send + Sync {
    /// Code in `[0, VERIFICATION_CODE_LIMIT)`.
    fn verification_code(&self) -> u64;
    fn nonce(&self) -> u32;
}

/// Thread-local RNG backed challenges. Codes are not checked for collisions;
/// the request id is part of the session key.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomChallenges;

impl ChallengeSource for RandomChallenges {
    fn verification_code(&self) -> u64 {
        rand::thread_rng().gen_range(0..VERIFICATION_CODE_LIMIT)
    }

    fn nonce(&self) -> u32 {
        rand::thread_rng().gen_range(0..=u32::MAX)
    }
}
