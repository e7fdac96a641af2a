use rand::Rng;

use crate::error::ParseError;

pub const NANOS_PER_MILLI: u128 = 1_000_000;

/// Event time in nanoseconds since the Unix epoch.
///
/// Gatling only records milliseconds. The sub-millisecond part is random so that two records sharing
/// a millisecond do not land on the same series key in InfluxDB and overwrite each other. The
/// millisecond part is always the one from the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventTime(u128);

impl EventTime {
    pub fn from_nanos(nanos: u128) -> Self {
        Self(nanos)
    }

    pub fn as_nanos(&self) -> u128 {
        self.0
    }

    pub fn as_millis(&self) -> u128 {
        self.0 / NANOS_PER_MILLI
    }

    /// Whole milliseconds from `earlier` to `self`, zero if `earlier` is later.
    pub fn millis_since(&self, earlier: EventTime) -> u64 {
        let millis = self.as_millis().saturating_sub(earlier.as_millis());
        u64::try_from(millis).unwrap_or(u64::MAX)
    }
}

/// Parse a decimal millisecond epoch timestamp and add a random offset in `[0, 1ms)`.
pub fn parse_jittered<R>(raw: &str, rng: &mut R) -> Result<EventTime, ParseError>
where
    R: Rng + ?Sized,
{
    let millis = raw
        .trim()
        .parse::<u64>()
        .map_err(|source| ParseError::InvalidTimestamp {
            value: raw.to_string(),
            source,
        })?;

    let jitter = rng.gen_range(0..NANOS_PER_MILLI);

    Ok(EventTime(u128::from(millis) * NANOS_PER_MILLI + jitter))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn jitter_stays_inside_the_millisecond() {
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..10_000 {
            let time = parse_jittered("1700000000123", &mut rng).unwrap();
            assert_eq!(1_700_000_000_123, time.as_millis());
            assert!(time.as_nanos() >= 1_700_000_000_123 * NANOS_PER_MILLI);
            assert!(time.as_nanos() < 1_700_000_000_124 * NANOS_PER_MILLI);
        }
    }

    #[test]
    fn jitter_never_reorders_distinct_milliseconds() {
        let mut rng = StdRng::seed_from_u64(42);
        let sources = (0..2_000u64)
            .map(|_| rng.gen_range(1_600_000_000_000u64..1_600_000_010_000))
            .collect::<Vec<_>>();

        let times = sources
            .iter()
            .map(|ms| parse_jittered(&ms.to_string(), &mut rng).unwrap())
            .collect::<Vec<_>>();

        for (i, a) in sources.iter().enumerate() {
            for (j, b) in sources.iter().enumerate().skip(i + 1) {
                if a < b {
                    assert!(times[i] < times[j]);
                } else if a > b {
                    assert!(times[i] > times[j]);
                }
            }
        }
    }

    #[test]
    fn shared_millisecond_gets_distinct_keys() {
        let mut rng = StdRng::seed_from_u64(1);
        let first = parse_jittered("1700000000000", &mut rng).unwrap();
        let second = parse_jittered("1700000000000", &mut rng).unwrap();

        assert_eq!(first.as_millis(), second.as_millis());
        assert_ne!(first, second);
    }

    #[test]
    fn rejects_non_numeric() {
        let mut rng = StdRng::seed_from_u64(1);

        let err = parse_jittered("17000x", &mut rng).unwrap_err();
        assert!(matches!(err, ParseError::InvalidTimestamp { .. }));
        assert!(parse_jittered("", &mut rng).is_err());
        assert!(parse_jittered("-5", &mut rng).is_err());
    }

    #[test]
    fn millis_since() {
        let start = EventTime::from_nanos(1_000 * NANOS_PER_MILLI + 999_999);
        let end = EventTime::from_nanos(1_250 * NANOS_PER_MILLI);

        assert_eq!(250, end.millis_since(start));
        assert_eq!(0, start.millis_since(end));
    }
}
