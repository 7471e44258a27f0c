use lore_core::domain::Chunk;

pub const SYSTEM_INSTRUCTION: &str = r#"You are an evidence-grounded reasoning engine that checks a claim about a story against excerpts from that story.

Rules:
1. Use ONLY the evidence provided. Do not use outside knowledge of the story or its author.
2. Every fact you assert must be backed by a quote copied verbatim, character for character, from one evidence node. Cite the node id it came from.
3. Consider at least one alternative explanation and say why you prefer or reject it.
4. Reply with a single JSON object and nothing else, shaped like this:
{
  "status": "SUCCESS" | "REJECTION" | "CONTRADICTION",
  "rejection_reason": string or null,
  "primary_hypothesis": {
    "hypothesis_text": string,
    "supporting_evidence": [
      {"quote_text": string, "chapter_id": string, "paragraph_index": integer or null, "source_node_id": string}
    ],
    "confidence_score": number between 0 and 1,
    "is_contradicted": boolean
  },
  "alternatives_considered": [ same shape as primary_hypothesis ],
  "logical_steps": [ at least two strings ]
}
5. If the evidence is insufficient to decide, set "status" to "REJECTION" and explain why in "rejection_reason".
6. If the evidence contradicts the claim, set "status" to "CONTRADICTION"."#;

/// `[Node <id>] (Chapter: <label>):` header followed by the verbatim text.
pub fn evidence_blocks(evidence: &[Chunk]) -> String {
    evidence
        .iter()
        .map(|c| format!("[Node {}] (Chapter: {}):\n{}", c.chunk_id, c.chapter_label, c.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn user_prompt(claim: &str, evidence: &[Chunk]) -> String {
    format!(
        "CLAIM:\n{}\n\nEVIDENCE:\n{}\n\nReturn the JSON reasoning trace.",
        claim.trim(),
        evidence_blocks(evidence)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn chunk(id: &str, chapter: &str, text: &str) -> Chunk {
        Chunk {
            chunk_id: id.to_string(),
            story_id: "s".to_string(),
            chapter_label: chapter.to_string(),
            paragraph_index: 0,
            text: text.to_string(),
            word_count: 1,
            char_offset: 0,
        }
    }

    #[test]
    fn blocks_label_node_and_chapter() {
        let blocks = evidence_blocks(&[
            chunk("s_ch1_p0", "ch_1", "First."),
            chunk("s_ch2_p3", "ch_2", "Second."),
        ]);
        assert_eq!(
            blocks,
            "[Node s_ch1_p0] (Chapter: ch_1):\nFirst.\n\n[Node s_ch2_p3] (Chapter: ch_2):\nSecond."
        );
    }

    #[test]
    fn prompt_carries_claim_and_evidence() {
        let p = user_prompt("  He was a sailor. ", &[chunk("a", "ch_1", "He sailed.")]);
        assert!(p.starts_with("CLAIM:\nHe was a sailor.\n"));
        assert!(p.contains("[Node a] (Chapter: ch_1):\nHe sailed."));
    }
}
