//! 途中で切れたJSONの修復
//!
//! 大きなLLM出力は末尾で途切れることがある。次の順に試し、
//! 最初にパースできたものを返す:
//! 1. 先頭の説明文と、閉じ括弧以降の余計なテキストを除去
//! 2. 未終端の文字列を閉じ、不足している `}` / `]` を補う
//! 3. 直近の安全な位置（`,` の手前や `{` `[` の直後）まで戻して閉じる
//!
//! どの段階でも末尾カンマは取り除く。

use std::collections::VecDeque;

/// これより大きい入力は修復しない
pub const MAX_REPAIR_INPUT: usize = 1 << 20;

/// 巻き戻しを試す安全位置の最大数
const MAX_CUT_ATTEMPTS: usize = 64;

#[derive(Debug, Clone)]
struct SafePoint {
    pos: usize,
    closers: Vec<char>,
}

#[derive(Debug, Default)]
struct Scan {
    closers: Vec<char>,
    in_string: bool,
    escaped: bool,
    /// トップレベルの値が閉じた位置（排他的終端）
    complete_end: Option<usize>,
    /// 閉じ括弧の対応が崩れていた
    mismatched: bool,
    safe_points: VecDeque<SafePoint>,
}

impl Scan {
    fn mark_safe(&mut self, pos: usize) {
        if self.safe_points.len() == MAX_CUT_ATTEMPTS {
            self.safe_points.pop_front();
        }
        self.safe_points.push_back(SafePoint {
            pos,
            closers: self.closers.clone(),
        });
    }
}

fn scan(body: &str) -> Scan {
    let mut state = Scan::default();

    for (i, c) in body.char_indices() {
        if state.in_string {
            if state.escaped {
                state.escaped = false;
            } else if c == '\\' {
                state.escaped = true;
            } else if c == '"' {
                state.in_string = false;
            }
            continue;
        }

        match c {
            '"' => state.in_string = true,
            '{' => {
                state.closers.push('}');
                state.mark_safe(i + 1);
            }
            '[' => {
                state.closers.push(']');
                state.mark_safe(i + 1);
            }
            '}' | ']' => {
                if state.closers.last() != Some(&c) {
                    state.mismatched = true;
                    break;
                }
                state.closers.pop();
                if state.closers.is_empty() {
                    state.complete_end = Some(i + 1);
                    break;
                }
                state.mark_safe(i + 1);
            }
            ',' if !state.closers.is_empty() => state.mark_safe(i),
            _ => {}
        }
    }

    state
}

/// 先頭の `{` / `[` から対応する閉じ括弧までの終端位置
///
/// 閉じていなければ None
pub fn balanced_end(body: &str) -> Option<usize> {
    scan(body).complete_end
}

/// 文字列外の末尾カンマ（`,` の直後が `}` / `]`）を除去
pub fn strip_trailing_commas(json: &str) -> String {
    let chars: Vec<char> = json.chars().collect();
    let mut out = String::with_capacity(json.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            out.push(c);
            continue;
        }
        if c == '"' {
            in_string = true;
        } else if c == ',' {
            let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(c);
    }

    out
}

fn close(prefix: &str, closers: &[char]) -> String {
    let mut out = String::with_capacity(prefix.len() + closers.len());
    out.push_str(prefix);
    out.extend(closers.iter().rev());
    strip_trailing_commas(&out)
}

fn parses(candidate: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(candidate).is_ok()
}

/// 修復を試み、パース可能なJSON文字列を返す
///
/// JSONの開始が見つからない、入力が大きすぎる、修復しても
/// パースできない場合は None
pub fn repair_json(input: &str) -> Option<String> {
    if input.len() > MAX_REPAIR_INPUT {
        return None;
    }
    let start = input.find(['{', '['])?;
    let body = &input[start..];
    let state = scan(body);

    if let Some(end) = state.complete_end {
        let candidate = strip_trailing_commas(&body[..end]);
        return parses(&candidate).then_some(candidate);
    }
    if state.mismatched {
        return None;
    }

    // 末尾をその場で閉じる
    let mut prefix = body.to_string();
    if state.in_string {
        if state.escaped {
            prefix.pop();
        }
        prefix.push('"');
    }
    let candidate = close(&prefix, &state.closers);
    if parses(&candidate) {
        return Some(candidate);
    }

    // 安全な位置まで巻き戻す
    state
        .safe_points
        .iter()
        .rev()
        .map(|point| close(&body[..point.pos], &point.closers))
        .find(|candidate| parses(candidate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    const ORIGINAL: &str = r#"{"analysis": "Broad face with a \"strong\" jaw", "primary_region": "Northern Europe", "matches": [{"phenotype": "Nordid", "confidence": 82, "reasoning": "tall cranial vault"}, {"phenotype": "Dinarid", "confidence": 64, "reasoning": "steep occiput", "rank": 2}, {"phenotype": "Alpinid", "confidence": 40}]}"#;

    fn keys(v: &Value) -> Vec<String> {
        v.as_object()
            .map(|o| o.keys().cloned().collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_complete_json_untouched() {
        let repaired = repair_json(ORIGINAL).unwrap();
        let a: Value = serde_json::from_str(&repaired).unwrap();
        let b: Value = serde_json::from_str(ORIGINAL).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_strips_wrapper_text() {
        let response = format!("Sure! Here is the result:\n{}\nHope this helps.", ORIGINAL);
        let repaired = repair_json(&response).unwrap();
        assert!(repaired.starts_with('{'));
        assert!(repaired.ends_with('}'));
    }

    #[test]
    fn test_truncated_mid_string() {
        let cut = ORIGINAL.find("Dinarid").unwrap() + 3;
        let repaired = repair_json(&ORIGINAL[..cut]).unwrap();
        let v: Value = serde_json::from_str(&repaired).unwrap();
        let matches = v["matches"].as_array().unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[1]["phenotype"], "Din");
    }

    #[test]
    fn test_truncated_mid_key_rolls_back() {
        let cut = ORIGINAL.find("\"reasoning\": \"steep").unwrap() + 5;
        let repaired = repair_json(&ORIGINAL[..cut]).unwrap();
        let v: Value = serde_json::from_str(&repaired).unwrap();
        let second = &v["matches"][1];
        assert_eq!(keys(second), vec!["confidence".to_string(), "phenotype".to_string()]);
    }

    #[test]
    fn test_trailing_commas() {
        let repaired = repair_json(r#"{"matches": [1, 2,], }"#).unwrap();
        assert_eq!(repaired, r#"{"matches": [1, 2] }"#);
    }

    #[test]
    fn test_dangling_escape() {
        let repaired = repair_json(r#"{"analysis": "ends with \"#).unwrap();
        let v: Value = serde_json::from_str(&repaired).unwrap();
        assert_eq!(v["analysis"], "ends with ");
    }

    #[test]
    fn test_no_json() {
        assert!(repair_json("no structured output at all").is_none());
        assert!(repair_json("").is_none());
    }

    #[test]
    fn test_mismatched_brackets() {
        assert!(repair_json(r#"{"matches": [1, 2}"#).is_none());
    }

    #[test]
    fn test_every_prefix_repairs_to_subset() {
        let original: Value = serde_json::from_str(ORIGINAL).unwrap();
        let top_keys = keys(&original);
        let original_matches = original["matches"].as_array().unwrap();

        for (cut, _) in ORIGINAL.char_indices().skip(1) {
            let prefix = &ORIGINAL[..cut];
            let repaired = repair_json(prefix)
                .unwrap_or_else(|| panic!("修復失敗: {}", prefix));
            let v: Value = serde_json::from_str(&repaired).unwrap();

            for key in keys(&v) {
                assert!(top_keys.contains(&key), "余計なキー {} ({})", key, prefix);
            }
            if let Some(matches) = v.get("matches").and_then(Value::as_array) {
                assert!(matches.len() <= original_matches.len());
                for (m, o) in matches.iter().zip(original_matches) {
                    let allowed = keys(o);
                    for key in keys(m) {
                        assert!(allowed.contains(&key), "余計なキー {} ({})", key, prefix);
                    }
                }
            }
        }
    }

    #[test]
    fn test_balanced_end() {
        assert_eq!(balanced_end(r#"{"a": "}"} trailing"#), Some(10));
        assert_eq!(balanced_end(r#"{"a": [1"#), None);
    }
}
