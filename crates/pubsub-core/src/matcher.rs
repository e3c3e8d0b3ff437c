//! Topic compilation and MQTT-style wildcard matching.
//!
//! Wildcards:
//! - `+` matches exactly one topic segment.
//! - `#` matches zero or more remaining segments; valid only as the final
//!   segment of a pattern.
//!
//! Patterns without wildcards take an equality fast path. A bounded cache
//! of compiled matchers (keyed by pattern, FIFO-evicted at capacity) is
//! owned by the bus so repeated `subscribe` calls with the same pattern
//! don't recompile.

use std::fmt::Display;

use smallvec::SmallVec;
use ustr::Ustr;

use crate::cache::fifo::FifoCacheMap;

/// Most patterns in practice run 2-4 segments deep; inline that many
/// before spilling to the heap.
type SegmentVec = SmallVec<[Segment; 4]>;

/// Marker for subscription patterns. May contain `+`/`#` wildcards.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Pattern;

/// Marker for publish topics. No wildcards allowed.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Topic;

/// An interned, marker-typed topic/pattern string.
///
/// `MStr<Topic>` is a validated, wildcard-free topic produced at publish
/// time; `MStr<Pattern>` is an unvalidated-at-construction subscription
/// pattern (validity is established by [`compile`] instead, since an
/// invalid pattern must fail `subscribe` with a specific error rather
/// than panic at conversion).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct MStr<T> {
    value: Ustr,
    _marker: std::marker::PhantomData<T>,
}

impl<T> Display for MStr<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl<T> AsRef<str> for MStr<T> {
    fn as_ref(&self) -> &str {
        self.value.as_str()
    }
}

impl<T> MStr<T> {
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.value.as_str()
    }
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

impl MStr<Topic> {
    /// Validates and constructs a publish topic.
    ///
    /// # Errors
    ///
    /// Returns an error if the topic is empty, has a leading, trailing,
    /// or repeated `.`, contains a wildcard character, or any segment
    /// has characters outside `[A-Za-z0-9_-]`.
    pub fn topic<S: AsRef<str>>(value: S) -> Result<Self, MatchError> {
        let value = value.as_ref();
        if value.is_empty() {
            return Err(MatchError::Empty);
        }
        for segment in value.split('.') {
            if segment == "+" || segment == "#" {
                return Err(MatchError::WildcardInTopic);
            }
            if !is_valid_segment(segment) {
                return Err(MatchError::InvalidSegment(segment.to_string()));
            }
        }
        Ok(Self {
            value: Ustr::from(value),
            _marker: std::marker::PhantomData,
        })
    }
}

impl TryFrom<&str> for MStr<Topic> {
    type Error = MatchError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::topic(value)
    }
}

impl MStr<Pattern> {
    #[must_use]
    pub fn pattern<S: AsRef<str>>(value: S) -> Self {
        Self {
            value: Ustr::from(value.as_ref()),
            _marker: std::marker::PhantomData,
        }
    }
}

impl From<&str> for MStr<Pattern> {
    fn from(value: &str) -> Self {
        Self::pattern(value)
    }
}

impl From<String> for MStr<Pattern> {
    fn from(value: String) -> Self {
        Self::pattern(value)
    }
}

impl From<MStr<Topic>> for MStr<Pattern> {
    fn from(value: MStr<Topic>) -> Self {
        Self {
            value: value.value,
            _marker: std::marker::PhantomData,
        }
    }
}

/// A pattern or topic failed compilation or validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchError {
    #[error("pattern is empty")]
    Empty,
    #[error("pattern has a leading, trailing, or repeated '.'")]
    MalformedSeparators,
    #[error("'#' is only valid as the final segment")]
    MultiNotFinal,
    #[error("segment contains invalid characters: {0}")]
    InvalidSegment(String),
    #[error("topic may not contain wildcard characters")]
    WildcardInTopic,
}

/// One segment of a compiled pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Single,
    Multi,
}

/// A pattern compiled into an ordered segment list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledMatcher {
    segments: SegmentVec,
    /// Precomputed for the equality fast path.
    pub has_wildcards: bool,
}

impl CompiledMatcher {
    /// Compiles a subscription pattern.
    ///
    /// # Errors
    ///
    /// Returns [`MatchError`] for an empty pattern, malformed `.`
    /// separators, a non-final `#`, or a segment with characters outside
    /// `[A-Za-z0-9_-]` (ignoring the wildcard segments `+`/`#`).
    pub fn compile(pattern: &str) -> Result<Self, MatchError> {
        if pattern.is_empty() {
            return Err(MatchError::Empty);
        }
        if pattern.starts_with('.') || pattern.ends_with('.') || pattern.contains("..") {
            return Err(MatchError::MalformedSeparators);
        }

        let raw_segments: Vec<&str> = pattern.split('.').collect();
        let mut segments = SegmentVec::with_capacity(raw_segments.len());
        let mut has_wildcards = false;

        for (i, raw) in raw_segments.iter().enumerate() {
            let is_last = i + 1 == raw_segments.len();
            match *raw {
                "#" => {
                    if !is_last {
                        return Err(MatchError::MultiNotFinal);
                    }
                    has_wildcards = true;
                    segments.push(Segment::Multi);
                }
                "+" => {
                    has_wildcards = true;
                    segments.push(Segment::Single);
                }
                other => {
                    if !is_valid_segment(other) {
                        return Err(MatchError::InvalidSegment(other.to_string()));
                    }
                    segments.push(Segment::Literal(other.to_string()));
                }
            }
        }

        Ok(Self {
            segments,
            has_wildcards,
        })
    }

    /// Returns whether `topic` matches this compiled pattern.
    #[must_use]
    pub fn matches(&self, topic: &str) -> bool {
        if !self.has_wildcards {
            return self
                .segments
                .iter()
                .map(|s| match s {
                    Segment::Literal(l) => l.as_str(),
                    _ => unreachable!("non-wildcard pattern has no wildcard segments"),
                })
                .eq(topic.split('.'));
        }

        let topic_segments: Vec<&str> = topic.split('.').collect();
        match_segments(&self.segments, &topic_segments)
    }
}

fn match_segments(pattern: &[Segment], topic: &[&str]) -> bool {
    let mut pi = 0;
    let mut ti = 0;

    while pi < pattern.len() {
        match &pattern[pi] {
            Segment::Multi => {
                // Only valid as the final segment (enforced at compile time).
                return true;
            }
            Segment::Single => {
                if ti >= topic.len() {
                    return false;
                }
                pi += 1;
                ti += 1;
            }
            Segment::Literal(l) => {
                if ti >= topic.len() || topic[ti] != l {
                    return false;
                }
                pi += 1;
                ti += 1;
            }
        }
    }

    ti == topic.len()
}

/// Bound on the compiled-matcher cache (spec: 1000 entries, FIFO-evicted).
pub const MATCHER_CACHE_CAPACITY: usize = 1000;

/// A bounded, per-bus cache of compiled matchers.
///
/// Purely an optimization: eviction never affects match semantics, only
/// whether a pattern is recompiled on the next `subscribe`.
#[derive(Debug)]
pub struct MatcherCache {
    entries: FifoCacheMap<Ustr, CompiledMatcher, MATCHER_CACHE_CAPACITY>,
}

impl Default for MatcherCache {
    fn default() -> Self {
        Self {
            entries: FifoCacheMap::new(),
        }
    }
}

impl MatcherCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the compiled matcher for `pattern`, compiling and caching
    /// it on a miss.
    ///
    /// # Errors
    ///
    /// Propagates [`CompiledMatcher::compile`] errors on a cache miss.
    pub fn get_or_compile(&mut self, pattern: MStr<Pattern>) -> Result<CompiledMatcher, MatchError> {
        let key = Ustr::from(pattern.as_str());
        if let Some(compiled) = self.entries.get(&key) {
            return Ok(compiled.clone());
        }
        let compiled = CompiledMatcher::compile(pattern.as_str())?;
        self.entries.insert(key, compiled.clone());
        Ok(compiled)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        MATCHER_CACHE_CAPACITY
    }
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng, rngs::StdRng};
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("a", "a", true)]
    #[case("a", "b", false)]
    #[case("a.b.c", "a.b.c", true)]
    #[case("a.b.c", "a.b.d", false)]
    #[case("a.b", "a.b.c", false)]
    fn test_literal_match(#[case] topic: &str, #[case] pattern: &str, #[case] expected: bool) {
        let compiled = CompiledMatcher::compile(pattern).unwrap();
        assert_eq!(compiled.matches(topic), expected);
    }

    #[rstest]
    #[case("a", "a.#", true)]
    #[case("a.b", "a.#", true)]
    #[case("a.b.c", "a.#", true)]
    #[case("x", "a.#", false)]
    #[case("cart.item.add", "cart.#", true)]
    #[case("cart", "cart.#", true)]
    #[case("user.login", "cart.#", false)]
    fn test_multi_wildcard(#[case] topic: &str, #[case] pattern: &str, #[case] expected: bool) {
        let compiled = CompiledMatcher::compile(pattern).unwrap();
        assert_eq!(compiled.matches(topic), expected);
    }

    #[rstest]
    #[case("a.x.b", "a.+.b", true)]
    #[case("a.x.y.b", "a.+.b", false)]
    #[case("a.b", "a.+.b", false)]
    #[case("a.x.c", "a.+.b", false)]
    fn test_single_wildcard(#[case] topic: &str, #[case] pattern: &str, #[case] expected: bool) {
        let compiled = CompiledMatcher::compile(pattern).unwrap();
        assert_eq!(compiled.matches(topic), expected);
    }

    #[rstest]
    fn test_multi_not_final_rejected() {
        assert_eq!(
            CompiledMatcher::compile("a.#.b"),
            Err(MatchError::MultiNotFinal)
        );
    }

    #[rstest]
    #[case("")]
    #[case(".a")]
    #[case("a.")]
    #[case("a..b")]
    fn test_malformed_patterns_rejected(#[case] pattern: &str) {
        assert!(CompiledMatcher::compile(pattern).is_err());
    }

    #[rstest]
    #[case("a/b")]
    #[case("a b")]
    #[case("a.b!")]
    fn test_invalid_segment_chars_rejected(#[case] pattern: &str) {
        assert!(matches!(
            CompiledMatcher::compile(pattern),
            Err(MatchError::InvalidSegment(_))
        ));
    }

    #[rstest]
    fn test_topic_rejects_wildcards() {
        assert!(MStr::<Topic>::topic("a.+.b").is_err());
        assert!(MStr::<Topic>::topic("a.#").is_err());
    }

    #[rstest]
    fn test_topic_accepts_plain() {
        assert!(MStr::<Topic>::topic("cart.item.add").is_ok());
    }

    #[rstest]
    fn test_matcher_cache_reuses_compiled() {
        let mut cache = MatcherCache::new();
        let p: MStr<Pattern> = "cart.#".into();
        assert_eq!(cache.len(), 0);
        cache.get_or_compile(p).unwrap();
        assert_eq!(cache.len(), 1);
        cache.get_or_compile(p).unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[rstest]
    fn test_matcher_cache_capacity() {
        let cache = MatcherCache::new();
        assert_eq!(cache.capacity(), MATCHER_CACHE_CAPACITY);
    }

    // Property: for non-wildcard patterns, match(t, compile(p)) iff t == p.
    #[rstest]
    #[case("abc", "abc")]
    #[case("a.b.c", "a.b.c")]
    fn prop_literal_exact_equivalence(#[case] topic: &str, #[case] pattern: &str) {
        let compiled = CompiledMatcher::compile(pattern).unwrap();
        assert_eq!(compiled.matches(topic), topic == pattern);
    }

    /// Reference-model matcher used only to check the real implementation
    /// against, independent of its own segment-walking logic.
    fn reference_matches(topic: &[&str], pattern: &[&str]) -> bool {
        let mut pi = 0;
        let mut ti = 0;
        while pi < pattern.len() {
            match pattern[pi] {
                "#" => return true,
                "+" => {
                    if ti >= topic.len() {
                        return false;
                    }
                }
                lit => {
                    if ti >= topic.len() || topic[ti] != lit {
                        return false;
                    }
                }
            }
            pi += 1;
            ti += 1;
        }
        ti == topic.len()
    }

    fn generate_segment(rng: &mut StdRng, alphabet: &[&'static str]) -> String {
        alphabet[rng.random_range(0..alphabet.len())].to_string()
    }

    #[rstest]
    fn test_matcher_fuzz_against_reference_model() {
        let alphabet = ["a", "b", "c"];
        let mut rng = StdRng::seed_from_u64(7);

        for i in 0..1000 {
            let topic_len = rng.random_range(1..5);
            let topic_segments: Vec<String> =
                (0..topic_len).map(|_| generate_segment(&mut rng, &alphabet)).collect();
            let topic = topic_segments.join(".");

            let pattern_len = rng.random_range(1..5);
            let mut pattern_segments: Vec<String> = (0..pattern_len)
                .map(|_| {
                    let roll: f64 = rng.random();
                    if roll < 0.2 {
                        "+".to_string()
                    } else if roll < 0.3 {
                        "#".to_string()
                    } else {
                        generate_segment(&mut rng, &alphabet)
                    }
                })
                .collect();
            // '#' is only valid as the final segment; truncate after the
            // first occurrence so the generated pattern always compiles.
            if let Some(hash_pos) = pattern_segments.iter().position(|s| s == "#") {
                pattern_segments.truncate(hash_pos + 1);
            }
            let pattern = pattern_segments.join(".");

            let compiled = CompiledMatcher::compile(&pattern).unwrap();
            let topic_refs: Vec<&str> = topic_segments.iter().map(String::as_str).collect();
            let pattern_refs: Vec<&str> = pattern_segments.iter().map(String::as_str).collect();

            assert_eq!(
                compiled.matches(&topic),
                reference_matches(&topic_refs, &pattern_refs),
                "mismatch on iteration {i}: topic='{topic}' pattern='{pattern}'"
            );
        }
    }
}
