use std::collections::{HashMap, HashSet};

use super::Comment;

/// Builds the thread of a topic out of its flat set of comments.
///
/// Comments without a parent in the set are top level, including the ones
/// whose parent has not arrived yet. Every other comment ends up in the
/// `replies` of its top level ancestor, so a reply to a reply is shown one
/// level deep instead of being hidden. Both levels are ordered by
/// `created_at`, then `id`.
pub fn reconstruct(comments: Vec<Comment>) -> Vec<Comment> {
  let parents: HashMap<String, Option<String>> = comments
    .iter()
    .map(|comment| (comment.id.clone(), comment.parent_id.clone()))
    .collect();

  let mut top_level: Vec<Comment> = vec![];
  let mut replies: HashMap<String, Vec<Comment>> = HashMap::new();

  for mut comment in comments {
    comment.replies.clear();
    match top_level_ancestor(&comment.id, &parents) {
      Some(ancestor) => replies.entry(ancestor).or_default().push(comment),
      None => top_level.push(comment),
    }
  }

  sort(&mut top_level);
  for comment in top_level.iter_mut() {
    if let Some(mut children) = replies.remove(&comment.id) {
      sort(&mut children);
      comment.replies = children;
    }
  }

  top_level
}

/// `None` when `id` is top level itself. Parent chains that loop back on
/// themselves count as top level too.
fn top_level_ancestor(id: &str, parents: &HashMap<String, Option<String>>) -> Option<String> {
  let mut visited: HashSet<&str> = HashSet::from([id]);
  let mut current = id;
  let mut ancestor = None;

  while let Some(Some(parent)) = parents.get(current) {
    if !parents.contains_key(parent) {
      break;
    }
    if !visited.insert(parent.as_str()) {
      return None;
    }
    ancestor = Some(parent);
    current = parent.as_str();
  }

  ancestor.cloned()
}

fn sort(comments: &mut [Comment]) {
  comments.sort_by(|comment1, comment2| {
    comment1
      .created_at
      .cmp(&comment2.created_at)
      .then_with(|| comment1.id.cmp(&comment2.id))
  });
}

#[cfg(test)]
mod tests {
  use super::*;

  #[cfg(test)]
  use pretty_assertions::assert_eq;

  fn comment(id: &str, created_at: u64, parent_id: Option<&str>) -> Comment {
    Comment {
      id: id.to_string(),
      topic: String::from("10.1/abc"),
      parent_id: parent_id.map(str::to_string),
      author: String::from("author"),
      content: format!("comment {id}"),
      created_at,
      signature: String::new(),
      received_at: 0,
      replies: vec![],
    }
  }

  fn ids(comments: &[Comment]) -> Vec<&str> {
    comments.iter().map(|comment| comment.id.as_str()).collect()
  }

  #[test]
  fn empty_set_gives_empty_thread() {
    assert!(reconstruct(vec![]).is_empty());
  }

  #[test]
  fn replies_are_attached_to_their_parent() {
    let thread = reconstruct(vec![
      comment("r1", 12, Some("a")),
      comment("b", 20, None),
      comment("a", 10, None),
      comment("r2", 11, Some("a")),
    ]);

    assert_eq!(ids(&thread), vec!["a", "b"]);
    assert_eq!(ids(&thread[0].replies), vec!["r2", "r1"]);
    assert!(thread[1].replies.is_empty());
  }

  #[test]
  fn orphans_are_top_level_until_their_parent_shows_up() {
    let orphan = comment("child", 5, Some("parent"));

    let thread = reconstruct(vec![orphan.clone()]);
    assert_eq!(thread, vec![orphan.clone()]);

    let thread = reconstruct(vec![orphan, comment("parent", 10, None)]);
    assert_eq!(ids(&thread), vec!["parent"]);
    assert_eq!(ids(&thread[0].replies), vec!["child"]);
  }

  #[test]
  fn replies_to_replies_are_flattened_into_the_top_level_ancestor() {
    let thread = reconstruct(vec![
      comment("a", 1, None),
      comment("b", 2, Some("a")),
      comment("c", 3, Some("b")),
      comment("d", 4, Some("c")),
    ]);

    assert_eq!(ids(&thread), vec!["a"]);
    assert_eq!(ids(&thread[0].replies), vec!["b", "c", "d"]);
  }

  #[test]
  fn ties_are_broken_by_id() {
    let thread = reconstruct(vec![
      comment("b", 1, None),
      comment("a", 1, None),
      comment("c", 0, None),
    ]);

    assert_eq!(ids(&thread), vec!["c", "a", "b"]);
  }

  #[test]
  fn parent_cycles_do_not_hide_comments() {
    let thread = reconstruct(vec![
      comment("x", 1, Some("y")),
      comment("y", 2, Some("x")),
      comment("self", 3, Some("self")),
    ]);

    assert_eq!(ids(&thread), vec!["x", "y", "self"]);
  }

  #[test]
  fn input_order_does_not_matter() {
    let comments = vec![
      comment("a", 1, None),
      comment("b", 2, Some("a")),
      comment("c", 3, None),
      comment("d", 4, Some("c")),
    ];
    let mut reversed = comments.clone();
    reversed.reverse();

    assert_eq!(reconstruct(comments), reconstruct(reversed));
  }

  #[test]
  fn stale_replies_on_input_are_ignored() {
    let mut a = comment("a", 1, None);
    a.replies = vec![comment("ghost", 2, Some("a"))];

    let thread = reconstruct(vec![a]);

    assert!(thread[0].replies.is_empty());
  }
}
