//! Cross-table variant-name unification.
//!
//! Brochures mix technical qualifiers into trim headers ("VXi With ESP",
//! "ZXi+ AGS"). A chat service is asked to group raw labels under their
//! marketing trim, and every answer is checked offline: the canonical name
//! must occur literally (ASCII case-insensitive) inside its raw label.
//! Anything else, including any service failure, maps the label to itself.

use std::{
  collections::{BTreeMap, BTreeSet, HashMap},
  sync::Arc,
  time::Duration,
};

use spherical_core::services::{ChatService, strip_code_fence};

pub struct VariantUnifier {
  chat:    Option<Arc<dyn ChatService>>,
  timeout: Duration,
}

impl VariantUnifier {
  pub fn new(chat: Arc<dyn ChatService>, timeout: Duration) -> Self {
    Self { chat: Some(chat), timeout }
  }

  /// A unifier that always returns the identity mapping.
  pub fn identity() -> Self { Self { chat: None, timeout: Duration::ZERO } }

  /// Map every distinct label to its canonical trim name.
  pub async fn unify<'a>(
    &self,
    labels: impl IntoIterator<Item = &'a str>,
  ) -> BTreeMap<String, String> {
    let distinct: BTreeSet<&str> = labels.into_iter().collect();
    let mut mapping: BTreeMap<String, String> =
      distinct.iter().map(|l| (l.to_string(), l.to_string())).collect();

    let Some(chat) = &self.chat else {
      return mapping;
    };
    if distinct.len() < 2 {
      return mapping;
    }

    let prompt = unification_prompt(&distinct);
    let raw = match tokio::time::timeout(self.timeout, chat.complete(&prompt)).await {
      Ok(Ok(raw)) => raw,
      Ok(Err(e)) => {
        tracing::warn!(error = %e, "variant unification unavailable, using raw labels");
        return mapping;
      }
      Err(_) => {
        tracing::warn!("variant unification timed out, using raw labels");
        return mapping;
      }
    };

    let proposed: HashMap<String, String> = match serde_json::from_str(strip_code_fence(&raw)) {
      Ok(p) => p,
      Err(e) => {
        tracing::warn!(error = %e, "unparseable unification response, using raw labels");
        return mapping;
      }
    };

    for (label, canonical) in mapping.iter_mut() {
      let Some(candidate) = proposed.get(label.as_str()) else {
        continue;
      };
      match literal_substring(label, candidate.trim()) {
        Some(accepted) => *canonical = accepted.to_owned(),
        None => tracing::warn!(
          label = %label,
          candidate = %candidate,
          "rejected unification candidate that is not a substring of its label"
        ),
      }
    }
    mapping
  }
}

fn unification_prompt(labels: &BTreeSet<&str>) -> String {
  let list = serde_json::to_string(&labels.iter().collect::<Vec<_>>()).unwrap_or_default();
  format!(
    "These are column headers from a vehicle brochure specification table. Each names a \
     trim, sometimes with technical qualifiers such as transmission, safety pack, or tone.\n\
     Group them by base marketing trim. Return only a JSON object mapping every header \
     exactly as given to its base trim name. The base trim name must be copied verbatim \
     from the header; never invent or expand names.\n\
     Headers: {list}"
  )
}

/// The slice of `haystack` equal to `needle` ignoring ASCII case.
fn literal_substring<'a>(haystack: &'a str, needle: &str) -> Option<&'a str> {
  if needle.is_empty() {
    return None;
  }
  haystack.char_indices().find_map(|(i, _)| {
    let window = haystack.get(i..i + needle.len())?;
    window.eq_ignore_ascii_case(needle).then_some(window)
  })
}

#[cfg(test)]
mod tests {
  use spherical_core::services::{ServiceError, ServiceFuture};

  use super::*;

  struct Canned(&'static str);

  impl ChatService for Canned {
    fn complete<'a>(&'a self, _: &'a str) -> ServiceFuture<'a, String> {
      let reply = self.0.to_owned();
      Box::pin(async move { Ok(reply) })
    }
  }

  struct Down;

  impl ChatService for Down {
    fn complete<'a>(&'a self, _: &'a str) -> ServiceFuture<'a, String> {
      Box::pin(async { Err(ServiceError::Transport("connection refused".into())) })
    }
  }

  const LABELS: [&str; 3] = ["VXi With ESP", "ZXi+ AGS", "LXi"];

  #[tokio::test]
  async fn accepts_only_literal_substrings() {
    let reply = r#"```json
{"VXi With ESP": "vxi", "ZXi+ AGS": "ZXi Plus", "LXi": "LXi"}
```"#;
    let unifier = VariantUnifier::new(Arc::new(Canned(reply)), Duration::from_secs(1));
    let mapping = unifier.unify(LABELS).await;

    // Case-insensitive match keeps the label's own spelling.
    assert_eq!(mapping["VXi With ESP"], "VXi");
    // Invented expansion rejected.
    assert_eq!(mapping["ZXi+ AGS"], "ZXi+ AGS");
    assert_eq!(mapping["LXi"], "LXi");
  }

  #[tokio::test]
  async fn service_failures_fall_back_to_identity() {
    for unifier in [
      VariantUnifier::new(Arc::new(Down), Duration::from_secs(1)),
      VariantUnifier::new(Arc::new(Canned("not json")), Duration::from_secs(1)),
      VariantUnifier::identity(),
    ] {
      let mapping = unifier.unify(LABELS).await;
      assert!(mapping.iter().all(|(k, v)| k == v));
      assert_eq!(mapping.len(), 3);
    }
  }

  #[test]
  fn literal_substring_respects_char_boundaries() {
    assert_eq!(literal_substring("VXi With ESP", "with esp"), Some("With ESP"));
    assert_eq!(literal_substring("Zeta Ä", "Ä"), Some("Ä"));
    assert_eq!(literal_substring("VXi", ""), None);
    assert_eq!(literal_substring("VXi", "VXi Plus"), None);
  }
}
