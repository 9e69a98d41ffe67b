//! Journey-check tokens for UX simulation receipts.

use crate::core::types::{WorkPacket, truncate_chars};

const INTENT_LIMIT_CHARS: usize = 64;
const CITATION_LIMIT_CHARS: usize = 80;
const MAX_CITATIONS: usize = 3;

/// Derive the deduplicated journey-check token list for a work packet: the
/// packet id, context-pack presence, the intent truncated to 64 chars, and up
/// to 3 truncated citations.
pub fn derive_journeys(packet: &WorkPacket) -> Vec<String> {
    let mut tokens = vec![format!("task:{}", packet.task_id)];
    if !packet.context_pack.trim().is_empty() {
        tokens.push("context-pack".to_string());
    }
    tokens.push(format!(
        "intent:{}",
        truncate_chars(&packet.intent, INTENT_LIMIT_CHARS)
    ));
    for citation in packet.citations.iter().take(MAX_CITATIONS) {
        tokens.push(format!(
            "cite:{}",
            truncate_chars(citation, CITATION_LIMIT_CHARS)
        ));
    }

    let mut deduped = Vec::with_capacity(tokens.len());
    for token in tokens {
        if !deduped.contains(&token) {
            deduped.push(token);
        }
    }
    deduped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(citations: &[&str]) -> WorkPacket {
        WorkPacket {
            task_id: "TASK-1".to_string(),
            intent: "complete TASK-1".to_string(),
            context_pack: "pack body".to_string(),
            citations: citations.iter().map(|c| c.to_string()).collect(),
            strategy: Vec::new(),
        }
    }

    #[test]
    fn derives_task_context_intent_and_citations() {
        let journeys = derive_journeys(&packet(&["doc:a", "doc:b"]));
        assert_eq!(
            journeys,
            vec![
                "task:TASK-1",
                "context-pack",
                "intent:complete TASK-1",
                "cite:doc:a",
                "cite:doc:b",
            ]
        );
    }

    #[test]
    fn caps_citations_at_three_and_dedupes() {
        let journeys = derive_journeys(&packet(&["doc:a", "doc:a", "doc:b", "doc:c"]));
        let cites: Vec<&String> = journeys
            .iter()
            .filter(|token| token.starts_with("cite:"))
            .collect();
        assert_eq!(cites.len(), 2); // a deduped, c beyond the cap
    }

    #[test]
    fn truncates_long_intent() {
        let mut p = packet(&[]);
        p.intent = "x".repeat(100);
        let journeys = derive_journeys(&p);
        let intent = journeys
            .iter()
            .find(|token| token.starts_with("intent:"))
            .expect("intent token");
        assert_eq!(intent.len(), "intent:".len() + 64);
    }

    #[test]
    fn omits_context_token_for_blank_pack() {
        let mut p = packet(&[]);
        p.context_pack = "  ".to_string();
        assert!(!derive_journeys(&p).contains(&"context-pack".to_string()));
    }
}
