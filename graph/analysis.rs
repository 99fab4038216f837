/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Lightweight text analysis shown alongside a thought's details.

use std::collections::HashSet;

const MAX_KEYWORDS: usize = 5;
const MIN_KEYWORD_CHARS: usize = 4;
const KEYWORD_TRIM_CHARS: &[char] = &['.', ',', '!', '?', '(', ')', '[', ']', '{', '}'];

pub const GENERAL_CATEGORY: &str = "general";

/// Category name and the substrings that select it, checked in order.
const CATEGORIES: &[(&str, &[&str])] = &[
    ("technology", &["ai", "software", "code", "tech", "computer"]),
    ("philosophy", &["meaning", "purpose", "ethics"]),
    ("personal", &["feel", "emotion", "life", "mood"]),
    ("work", &["project", "task", "deadline", "job"]),
    ("creativity", &["idea", "design", "creative"]),
    ("learning", &["study", "learn", "research"]),
    ("health", &["exercise", "sleep", "diet", "body"]),
    ("finance", &["money", "invest", "risk"]),
    ("relationships", &["friend", "family", "partner"]),
];

// Common English function words; only words longer than three characters
// matter since shorter ones are filtered anyway.
const STOP_WORDS: &[&str] = &[
    "about", "above", "across", "after", "afterwards", "again", "against", "almost", "alone",
    "along", "already", "also", "although", "always", "among", "amongst", "another", "anyhow",
    "anyone", "anything", "anyway", "anywhere", "around", "back", "became", "because", "become",
    "becomes", "becoming", "been", "before", "beforehand", "behind", "being", "below", "beside",
    "besides", "between", "beyond", "both", "bottom", "cannot", "could", "done", "down", "due",
    "during", "each", "either", "else", "elsewhere", "empty", "enough", "even", "ever", "every",
    "everyone", "everything", "everywhere", "except", "few", "fifteen", "fifty", "fill", "find",
    "first", "five", "former", "formerly", "forty", "found", "four", "from", "front", "full",
    "further", "give", "have", "hence", "here", "hereafter", "hereby", "herein", "hereupon",
    "hers", "herself", "himself", "however", "hundred", "indeed", "into", "itself", "keep",
    "last", "latter", "latterly", "least", "less", "made", "many", "meanwhile", "might", "mine",
    "more", "moreover", "most", "mostly", "move", "much", "must", "myself", "name", "namely",
    "neither", "never", "nevertheless", "next", "nine", "nobody", "none", "noone", "nothing",
    "nowhere", "often", "once", "only", "onto", "other", "others", "otherwise", "ours",
    "ourselves", "over", "part", "perhaps", "please", "rather", "same", "seem", "seemed",
    "seeming", "seems", "serious", "several", "should", "show", "side", "since", "sincere",
    "sixty", "some", "somehow", "someone", "something", "sometime", "sometimes", "somewhere",
    "still", "such", "take", "than", "that", "their", "them", "themselves", "then", "thence",
    "there", "thereafter", "thereby", "therefore", "therein", "thereupon", "these", "they",
    "thick", "thin", "third", "this", "those", "though", "three", "through", "throughout",
    "thru", "thus", "together", "too", "toward", "towards", "twelve", "twenty", "under",
    "until", "upon", "very", "well", "were", "what", "whatever", "when", "whence", "whenever",
    "where", "whereafter", "whereas", "whereby", "wherein", "whereupon", "wherever", "whether",
    "which", "while", "whither", "whoever", "whole", "whom", "whose", "will", "with", "within",
    "without", "would", "your", "yours", "yourself", "yourselves",
];

/// Up to five distinctive words from `text`, in first-seen order.
pub fn extract_keywords(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let mut seen = HashSet::new();
    lowered
        .split_whitespace()
        .map(|word| word.trim_matches(KEYWORD_TRIM_CHARS))
        .filter(|word| word.chars().count() >= MIN_KEYWORD_CHARS)
        .filter(|word| !STOP_WORDS.contains(word))
        .filter(|word| seen.insert(word.to_string()))
        .take(MAX_KEYWORDS)
        .map(str::to_string)
        .collect()
}

/// First category with a matching substring, else [`GENERAL_CATEGORY`].
pub fn guess_category(text: &str) -> &'static str {
    let lowered = text.to_lowercase();
    CATEGORIES
        .iter()
        .find(|(_, words)| words.iter().any(|word| lowered.contains(word)))
        .map(|(category, _)| *category)
        .unwrap_or(GENERAL_CATEGORY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn keywords_skip_short_and_stop_words() {
        let keywords = extract_keywords("Would the garden (finally) bloom, or would it rot?");
        assert_eq!(keywords, vec!["garden", "finally", "bloom"]);
    }

    #[test]
    fn keywords_are_unique_and_capped() {
        let keywords =
            extract_keywords("river river stone cloud maple ocean forest meadow canyon");
        assert_eq!(keywords, vec!["river", "stone", "cloud", "maple", "ocean"]);
    }

    #[rstest]
    #[case("Refactor the parser code tonight", "technology")]
    #[case("What gives life meaning?", "philosophy")]
    #[case("Sleep more and exercise", "health")]
    #[case("Call my friend", "relationships")]
    #[case("Buy oranges", GENERAL_CATEGORY)]
    fn category_uses_first_matching_list(#[case] text: &str, #[case] expected: &str) {
        assert_eq!(guess_category(text), expected);
    }
}
