//! Property tests for suggestion aggregation

use indexmap::IndexMap;
use proptest::prelude::*;

use autotemplate_rs::core::aggregation::{aggregate, Thresholds};
use autotemplate_rs::detectors::templates::StatementDescriptor;

const KEYS: [&str; 3] = [
    "After variable of type \"System.IO.Stream\"",
    "After call to \"System.Console.WriteLine\"",
    "After if (x == null)",
];
const TEMPLATES: [&str; 4] = [
    "$VariableName$.Close();",
    "$VariableName$.Flush();",
    "return;",
    "break;",
];

fn observations(picks: &[(usize, usize)]) -> Vec<StatementDescriptor> {
    picks
        .iter()
        .map(|&(key, template)| {
            StatementDescriptor::from_parts(KEYS[key], "App/A.cs", TEMPLATES[template], IndexMap::new())
        })
        .collect()
}

proptest! {
    #[test]
    fn aggregation_ignores_observation_order(
        picks in prop::collection::vec((0..3usize, 0..4usize), 0..60)
    ) {
        let thresholds = Thresholds::new(7, 1, 0);
        let forward = aggregate(observations(&picks), &thresholds, None);

        let mut reversed_picks = picks.clone();
        reversed_picks.reverse();
        let backward = aggregate(observations(&reversed_picks), &thresholds, None);

        prop_assert_eq!(forward, backward);
    }

    #[test]
    fn published_suggestions_respect_thresholds(
        picks in prop::collection::vec((0..3usize, 0..4usize), 1..80),
        min_occurrences in 1..6usize,
        min_percentage in 0..60usize,
        max_suggestions in 1..4usize,
    ) {
        let thresholds = Thresholds::new(max_suggestions, min_occurrences, min_percentage);
        let published = aggregate(observations(&picks), &thresholds, None);

        for key in KEYS {
            let for_key: Vec<_> = published.iter().filter(|t| t.key == key).collect();
            prop_assert!(for_key.len() <= max_suggestions);
            for pair in for_key.windows(2) {
                prop_assert!(pair[0].count >= pair[1].count);
            }
            for template in for_key {
                prop_assert!(template.count >= min_occurrences);
                prop_assert!(template.percentage >= min_percentage);
                prop_assert!(template.percentage <= 100);
            }
        }
    }
}
