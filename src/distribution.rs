use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::domain::PublishingDomain;

/// Policy choosing the publishing domain for an accepted article.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    #[default]
    RoundRobin,
    Weighted,
    Random,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::RoundRobin => "round_robin",
            Strategy::Weighted => "weighted",
            Strategy::Random => "random",
        }
    }
}

/// Pick a domain for the next article.
///
/// `weights` is parallel to `domains`. `success_counter` is the number of
/// articles published so far (lifetime plus this run) and drives round-robin.
pub fn select_target<'a, R: Rng + ?Sized>(
    domains: &'a [PublishingDomain],
    weights: &[u32],
    strategy: Strategy,
    success_counter: u64,
    rng: &mut R,
) -> Option<&'a PublishingDomain> {
    match domains.len() {
        0 => return None,
        1 => return domains.first(),
        _ => {}
    }

    match strategy {
        Strategy::RoundRobin => domains.get((success_counter % domains.len() as u64) as usize),
        Strategy::Random => domains.get(rng.random_range(0..domains.len())),
        Strategy::Weighted => {
            let weight = |i: usize| weights.get(i).copied().unwrap_or(1) as u64;
            let total: u64 = (0..domains.len()).map(weight).sum();
            if total == 0 {
                return domains.first();
            }

            let mut roll = rng.random_range(0..total);
            for (i, domain) in domains.iter().enumerate() {
                let w = weight(i);
                if roll < w {
                    return Some(domain);
                }
                roll -= w;
            }
            domains.last()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn domains(n: i64) -> Vec<PublishingDomain> {
        (1..=n)
            .map(|id| PublishingDomain {
                id,
                name: format!("Domain {}", id),
                hostname: format!("d{}.example.com", id),
                is_active: true,
            })
            .collect()
    }

    #[test]
    fn test_empty_and_single() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(select_target(&[], &[], Strategy::Random, 0, &mut rng).is_none());

        let one = domains(1);
        for strategy in [Strategy::RoundRobin, Strategy::Weighted, Strategy::Random] {
            assert_eq!(select_target(&one, &[0], strategy, 7, &mut rng).unwrap().id, 1);
        }
    }

    #[test]
    fn test_round_robin_fairness() {
        let all = domains(3);
        let mut rng = StdRng::seed_from_u64(2);
        let mut counts = [0usize; 3];

        // Continues from a lifetime counter of 5.
        for n in 5..(5 + 10) {
            let d = select_target(&all, &[], Strategy::RoundRobin, n, &mut rng).unwrap();
            counts[(d.id - 1) as usize] += 1;
        }

        for count in counts {
            assert!(count == 3 || count == 4, "counts were {:?}", counts);
        }
        assert_eq!(select_target(&all, &[], Strategy::RoundRobin, 5, &mut rng).unwrap().id, 3);
    }

    #[test]
    fn test_weighted_follows_weights() {
        let all = domains(2);
        let mut rng = StdRng::seed_from_u64(3);
        let mut heavy = 0;

        for _ in 0..2000 {
            if select_target(&all, &[9, 1], Strategy::Weighted, 0, &mut rng).unwrap().id == 1 {
                heavy += 1;
            }
        }
        assert!(heavy > 1600 && heavy < 1950, "heavy picked {} times", heavy);
    }

    #[test]
    fn test_weighted_zero_weight_never_picked() {
        let all = domains(3);
        let mut rng = StdRng::seed_from_u64(4);
        for _ in 0..200 {
            let d = select_target(&all, &[1, 0, 1], Strategy::Weighted, 0, &mut rng).unwrap();
            assert_ne!(d.id, 2);
        }
        assert_eq!(select_target(&all, &[0, 0, 0], Strategy::Weighted, 0, &mut rng).unwrap().id, 1);
    }

    #[test]
    fn test_random_covers_all() {
        let all = domains(3);
        let mut rng = StdRng::seed_from_u64(5);
        let mut seen = [false; 3];
        for _ in 0..100 {
            let d = select_target(&all, &[], Strategy::Random, 0, &mut rng).unwrap();
            seen[(d.id - 1) as usize] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn test_strategy_names() {
        let parsed: Strategy = serde_json::from_str("\"weighted\"").unwrap();
        assert_eq!(parsed, Strategy::Weighted);
        assert_eq!(Strategy::RoundRobin.as_str(), "round_robin");
    }
}
