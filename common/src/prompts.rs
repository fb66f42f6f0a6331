//! プロンプト生成モジュール
//!
//! Vision LLM に候補ラベル一覧と topK を渡し、厳密なJSONで返させる。

/// Vision 分類プロンプト生成
///
/// # Arguments
/// * `candidate_labels` - カタログの候補名（この中からのみ選ばせる）
/// * `top_k` - 返させる最大件数（0 なら件数制限なし）
pub fn build_vision_prompt(candidate_labels: &[&str], top_k: usize) -> String {
    let labels = candidate_labels.join(" | ");
    let limit = if top_k > 0 {
        format!("Return at most {} matches", top_k)
    } else {
        "Return every label that applies".to_string()
    };

    format!(
        r#"You are an expert physical anthropologist. Study the face in the attached photo and decide which of the candidate phenotype labels it resembles most.

## Candidate labels (choose ONLY from this list, spelled exactly as written)
{labels}

## Output format (strict JSON object, nothing else)
{{
  "analysis": "short objective description of the visible facial features",
  "primary_region": "broad geographic region most consistent with the features",
  "matches": [
    {{
      "phenotype": "one label from the candidate list",
      "confidence": 0-100,
      "reasoning": "which visible features support this label",
      "rank": 1
    }}
  ]
}}

## Rules
- {limit}, ordered from most to least likely
- confidence is a number between 0 and 100
- Describe only what is visible; do not guess identity
- Output the JSON object only. No markdown, no commentary"#
    )
}
