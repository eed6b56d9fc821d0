//! Ordered header multimap and header-name canonicalization.
//!
//! The interpreter receives every header as a list of values, even when the
//! header appeared once. Names are matched case-insensitively; the first
//! spelling seen for a name is the one kept.

use script_gateway_common::HeaderMode;

/// Ordered multimap from header name to values.
///
/// Both the order of names and the order of values within a name follow
/// insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMultimap {
    entries: Vec<(String, Vec<String>)>,
}

impl HeaderMultimap {
    /// Create an empty multimap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the interpreter's header set from request header entries.
    ///
    /// In [`HeaderMode::Capitalized`] names are canonicalized with
    /// [`canonicalize_header_name`]; in [`HeaderMode::Raw`] they are kept as
    /// given. Repeated names fold into one entry in arrival order. When
    /// `forward_host` is false the `host` header is dropped.
    pub fn from_request<I, N, V>(entries: I, mode: HeaderMode, forward_host: bool) -> Self
    where
        I: IntoIterator<Item = (N, V)>,
        N: AsRef<str>,
        V: Into<String>,
    {
        let mut headers = Self::new();
        for (name, value) in entries {
            let name = name.as_ref();
            if !forward_host && name.eq_ignore_ascii_case("host") {
                continue;
            }
            match mode {
                HeaderMode::Raw => headers.append(name, value),
                HeaderMode::Capitalized => headers.append(canonicalize_header_name(name), value),
            }
        }
        headers
    }

    /// Build from a flat list of alternating name and value tokens.
    ///
    /// A trailing name without a value is ignored.
    pub fn from_flat_tokens<S: AsRef<str>>(
        tokens: &[S],
        mode: HeaderMode,
        forward_host: bool,
    ) -> Self {
        let pairs = tokens
            .chunks_exact(2)
            .map(|pair| (pair[0].as_ref(), pair[1].as_ref().to_string()));
        Self::from_request(pairs, mode, forward_host)
    }

    /// Append a value, folding into an existing entry with the same name.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(index) => self.entries[index].1.push(value),
            None => self.entries.push((name, vec![value])),
        }
    }

    /// Builder-style [`append`](Self::append).
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.append(name, value);
        self
    }

    /// All values for `name`.
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.position(name).map(|i| self.entries[i].1.as_slice())
    }

    /// The first value for `name`.
    pub fn get_first(&self, name: &str) -> Option<&str> {
        self.get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Returns `true` if `name` is present.
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Number of distinct names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no headers.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over names with their value lists.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    /// Iterate over every `(name, value)` pair, repeating names as needed.
    pub fn iter_flat(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().flat_map(|(name, values)| {
            values
                .iter()
                .map(move |value| (name.as_str(), value.as_str()))
        })
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(existing, _)| existing.eq_ignore_ascii_case(name))
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for HeaderMultimap {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.append(name, value);
        }
        headers
    }
}

/// Title-case each hyphen-separated segment of a header name.
///
/// Only a lowercase ASCII letter at the start of a segment is changed, so
/// `content-type` becomes `Content-Type` and `x-API-key` becomes `X-API-Key`.
pub fn canonicalize_header_name(name: &str) -> String {
    let mut canonical = String::with_capacity(name.len());
    let mut segment_start = true;
    for c in name.chars() {
        if segment_start {
            canonical.push(c.to_ascii_uppercase());
        } else {
            canonical.push(c);
        }
        segment_start = c == '-';
    }
    canonical
}
