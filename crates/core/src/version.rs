//! Relevance ordering for version directories and build files.
//!
//! Names are ordered "most relevant first": the head of a sorted listing is
//! the latest version (or the newest build). Names are tokenized on `-` and
//! `.` and compared token by token:
//!
//! - two numeric tokens compare as integers, larger first;
//! - a numeric token precedes a textual one;
//! - two textual tokens compare lexicographically, smaller first;
//! - when one name is a token prefix of the other, the shorter name wins,
//!   so `2.8.10` precedes `2.8.10-SNAPSHOT`;
//! - names whose tokens all tie (`2.07` and `2.7`) fall back to plain
//!   string order, so distinct names never compare equal.
//!
//! Directories always precede files. The numeric/textual asymmetry is relied
//! upon by existing repositories and must stay as is.

use std::cmp::Ordering;

/// Compare two names, most relevant first.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    let mut left = tokens(a);
    let mut right = tokens(b);

    loop {
        match (left.next(), right.next()) {
            (Some(l), Some(r)) => {
                let ord = compare_tokens(l, r);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (None, None) => return a.cmp(b),
        }
    }
}

/// Compare two listing entries. Directories outrank files unconditionally.
pub fn compare_entries(a: &str, a_is_dir: bool, b: &str, b_is_dir: bool) -> Ordering {
    match (a_is_dir, b_is_dir) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => compare_names(a, b),
    }
}

/// Sort arbitrary items by relevance given a `(name, is_directory)` key.
pub fn sort_by_relevance<T, F>(items: &mut [T], key: F)
where
    F: Fn(&T) -> (&str, bool),
{
    items.sort_by(|a, b| {
        let (a_name, a_dir) = key(a);
        let (b_name, b_dir) = key(b);
        compare_entries(a_name, a_dir, b_name, b_dir)
    });
}

/// Sort plain names by relevance.
pub fn sort_names<S: AsRef<str>>(names: &mut [S]) {
    names.sort_by(|a, b| compare_names(a.as_ref(), b.as_ref()));
}

/// The most relevant name of a set, if any.
pub fn most_relevant<'a, I>(names: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    names.into_iter().min_by(|a, b| compare_names(a, b))
}

fn tokens(name: &str) -> impl Iterator<Item = &str> {
    name.split(['-', '.'])
}

fn compare_tokens(a: &str, b: &str) -> Ordering {
    match (is_numeric(a), is_numeric(b)) {
        (true, true) => compare_numeric(a, b).reverse(),
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.cmp(b),
    }
}

fn is_numeric(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit())
}

/// Integer comparison of arbitrary-length digit strings.
fn compare_numeric(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}
