use std::collections::HashSet;

use rand::Rng;
use rand::seq::SliceRandom;
use tandem_types::models::{Challenge, Gender, MediaKind, Role};

/// An entry in the challenge catalog. Content comes from outside the core;
/// the selector only decides which entry goes where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeTemplate {
    pub text: String,
    pub level: u8,
    pub kind: MediaKind,
    pub for_gender: Gender,
}

impl ChallengeTemplate {
    fn instantiate(&self, for_player: Role) -> Challenge {
        Challenge {
            text: self.text.clone(),
            level: self.level,
            kind: self.kind,
            for_gender: self.for_gender,
            for_player,
            completed: false,
            completed_by: None,
            completed_at: None,
            created_by_partner: false,
        }
    }
}

/// Pick one candidate for `(level, gender)` that is not in the exclusion
/// set. Falls back to any gender at the level, then to any level, so a thin
/// catalog degrades instead of dealing nothing.
pub fn select_challenge<'a, R: Rng + ?Sized>(
    catalog: &'a [ChallengeTemplate],
    level: u8,
    for_gender: Gender,
    exclude: &HashSet<&str>,
    rng: &mut R,
) -> Option<&'a ChallengeTemplate> {
    let passes: [&dyn Fn(&ChallengeTemplate) -> bool; 3] = [
        &|t| t.level == level && t.for_gender == for_gender,
        &|t| t.level == level,
        &|_| true,
    ];
    for pass in passes {
        let pool: Vec<&ChallengeTemplate> = catalog
            .iter()
            .filter(|t| pass(t) && !exclude.contains(t.text.as_str()))
            .collect();
        if !pool.is_empty() {
            return Some(pool[rng.random_range(0..pool.len())]);
        }
    }
    None
}

/// Draw a replacement for a skipped challenge, excluding every text already
/// dealt into the session so a skip never hands back the same challenge.
pub fn select_replacement<R: Rng + ?Sized>(
    catalog: &[ChallengeTemplate],
    original: &Challenge,
    dealt_texts: &HashSet<&str>,
    rng: &mut R,
) -> Option<Challenge> {
    select_challenge(catalog, original.level, original.for_gender, dealt_texts, rng)
        .map(|t| t.instantiate(original.for_player))
}

/// Deal the session's opening deck: `count` challenges strictly alternating
/// `for_player` starting with the creator, each drawn from the pool for the
/// acting role's gender, shuffled, without repeats while the pool lasts.
pub fn build_deck<R: Rng + ?Sized>(
    catalog: &[ChallengeTemplate],
    level: u8,
    creator_gender: Gender,
    partner_gender: Gender,
    count: usize,
    rng: &mut R,
) -> Vec<Challenge> {
    let mut pool_for = |gender: Gender| -> Vec<&ChallengeTemplate> {
        let mut pool: Vec<&ChallengeTemplate> = catalog
            .iter()
            .filter(|t| t.level == level && t.for_gender == gender)
            .collect();
        if pool.is_empty() {
            pool = catalog.iter().filter(|t| t.level == level).collect();
        }
        pool.shuffle(rng);
        pool
    };

    let creator_pool = pool_for(creator_gender);
    let partner_pool = pool_for(partner_gender);
    if creator_pool.is_empty() && partner_pool.is_empty() {
        return Vec::new();
    }

    let mut deck = Vec::with_capacity(count);
    let (mut ci, mut pi) = (0usize, 0usize);
    for slot in 0..count {
        let (role, pool, cursor) = if slot % 2 == 0 {
            (Role::Creator, &creator_pool, &mut ci)
        } else {
            (Role::Partner, &partner_pool, &mut pi)
        };
        if pool.is_empty() {
            continue;
        }
        // Wraps around once a thin pool is exhausted.
        let template = pool[*cursor % pool.len()];
        *cursor += 1;
        deck.push(template.instantiate(role));
    }
    deck
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn catalog() -> Vec<ChallengeTemplate> {
        let mut templates = Vec::new();
        for level in 1..=2u8 {
            for (gender, tag) in [(Gender::Female, "f"), (Gender::Male, "m")] {
                for i in 0..4 {
                    templates.push(ChallengeTemplate {
                        text: format!("l{level}-{tag}-{i}"),
                        level,
                        kind: MediaKind::Text,
                        for_gender: gender,
                    });
                }
            }
        }
        templates
    }

    #[test]
    fn deck_alternates_roles_and_matches_genders() {
        let mut rng = StdRng::seed_from_u64(7);
        let deck = build_deck(&catalog(), 1, Gender::Female, Gender::Male, 8, &mut rng);

        assert_eq!(deck.len(), 8);
        for (i, ch) in deck.iter().enumerate() {
            let expected_role = if i % 2 == 0 {
                Role::Creator
            } else {
                Role::Partner
            };
            assert_eq!(ch.for_player, expected_role);
            let expected_gender = match expected_role {
                Role::Creator => Gender::Female,
                Role::Partner => Gender::Male,
            };
            assert_eq!(ch.for_gender, expected_gender);
            assert_eq!(ch.level, 1);
            assert!(!ch.completed);
        }
    }

    #[test]
    fn deck_has_no_repeats_while_pool_lasts() {
        let mut rng = StdRng::seed_from_u64(3);
        let deck = build_deck(&catalog(), 2, Gender::Male, Gender::Female, 8, &mut rng);
        let texts: HashSet<&str> = deck.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts.len(), deck.len());
    }

    #[test]
    fn selection_honours_exclusions() {
        let catalog = catalog();
        let mut rng = StdRng::seed_from_u64(11);
        let exclude: HashSet<&str> = ["l1-f-0", "l1-f-1", "l1-f-2"].into();

        for _ in 0..20 {
            let picked =
                select_challenge(&catalog, 1, Gender::Female, &exclude, &mut rng).unwrap();
            assert!(!exclude.contains(picked.text.as_str()));
            assert_eq!(picked.level, 1);
            assert_eq!(picked.for_gender, Gender::Female);
        }
    }

    #[test]
    fn selection_falls_back_when_pool_is_thin() {
        let catalog = vec![ChallengeTemplate {
            text: "only entry in the catalog".into(),
            level: 3,
            kind: MediaKind::Photo,
            for_gender: Gender::Male,
        }];
        let mut rng = StdRng::seed_from_u64(1);

        // Wrong level and gender, but still the only candidate.
        let picked =
            select_challenge(&catalog, 1, Gender::Female, &HashSet::new(), &mut rng).unwrap();
        assert_eq!(picked.text, "only entry in the catalog");

        // Everything excluded: nothing to deal.
        let all: HashSet<&str> = ["only entry in the catalog"].into();
        assert!(select_challenge(&catalog, 1, Gender::Female, &all, &mut rng).is_none());
    }

    #[test]
    fn replacement_keeps_level_and_gender_pool() {
        let catalog = catalog();
        let mut rng = StdRng::seed_from_u64(5);
        let original = Challenge {
            text: "l2-f-0".into(),
            level: 2,
            kind: MediaKind::Text,
            for_gender: Gender::Female,
            for_player: Role::Partner,
            completed: false,
            completed_by: None,
            completed_at: None,
            created_by_partner: false,
        };
        let dealt: HashSet<&str> = ["l2-f-0"].into();

        let replacement = select_replacement(&catalog, &original, &dealt, &mut rng).unwrap();
        assert_ne!(replacement.text, original.text);
        assert_eq!(replacement.level, 2);
        assert_eq!(replacement.for_gender, Gender::Female);
        assert_eq!(replacement.for_player, Role::Partner);
    }
}
