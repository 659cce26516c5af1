// Cluster reasoning: plain-language explanations for a cluster report.
//
// Explains two things without any model calls: which recurring words tie the
// members together, and why the heading was picked.

use std::collections::HashSet;

use regex_lite::Regex;
use serde::Serialize;
use stop_words::{get, LANGUAGE};

use crate::db::models::Opinion;

/// Words that carry no theme in opinion statements but aren't in the
/// general English list.
const EXTRA_STOP_WORDS: &[&str] = &["need", "needs", "should", "must", "want", "think"];

/// How many recurring words count as themes, and how many are shown.
const MAX_THEMES: usize = 5;
const SHOWN_THEMES: usize = 3;

#[derive(Debug, Clone, Serialize)]
pub struct ClusterReasoning {
    /// Recurring words, most frequent first.
    pub themes: Vec<String>,
    pub clustering_reason: String,
    pub heading_rationale: String,
}

/// Explain a cluster from its members and heading.
pub fn explain(members: &[Opinion], heading: &str) -> ClusterReasoning {
    let themes = common_themes(members.iter().map(|m| m.text.as_str()));

    let clustering_reason = if themes.is_empty() {
        "These opinions were grouped together based on semantic similarity and shared concepts."
            .to_string()
    } else {
        let shown: Vec<&str> = themes.iter().take(SHOWN_THEMES).map(String::as_str).collect();
        format!(
            "These opinions were clustered together because they share common themes around: {}. \
             They express similar ideas and concerns.",
            shown.join(", ")
        )
    };

    let heading_rationale = format!(
        "The heading \"{}\" was chosen because it best summarizes the collective sentiment \
         and represents the key idea that connects all {} opinions in this cluster.",
        heading,
        members.len()
    );

    ClusterReasoning {
        themes,
        clustering_reason,
        heading_rationale,
    }
}

/// Words longer than three letters that appear more than once across the
/// texts, most frequent first (ties in order of first appearance).
pub fn common_themes<'a>(texts: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let stop: HashSet<String> = get(LANGUAGE::English)
        .into_iter()
        .chain(EXTRA_STOP_WORDS.iter().map(|w| w.to_string()))
        .collect();
    let Ok(word_re) = Regex::new(r"\b\w+\b") else {
        return Vec::new();
    };

    // (word, count) in first-seen order
    let mut counts: Vec<(String, usize)> = Vec::new();
    for text in texts {
        let lower = text.to_lowercase();
        for m in word_re.find_iter(&lower) {
            let word = m.as_str();
            if word.chars().count() <= 3 || stop.contains(word) {
                continue;
            }
            match counts.iter_mut().find(|(w, _)| w == word) {
                Some((_, c)) => *c += 1,
                None => counts.push((word.to_string(), 1)),
            }
        }
    }

    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
        .into_iter()
        .take(MAX_THEMES)
        .filter(|(_, c)| *c > 1)
        .map(|(w, _)| w)
        .collect()
}
