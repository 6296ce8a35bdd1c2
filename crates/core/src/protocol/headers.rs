/// Header fields in insertion order.
///
/// Keys are unique under ASCII case-insensitive comparison. The parser
/// stores names lower-cased; locally built messages keep whatever case the
/// caller used (e.g. `Content-Type`), which is what the serializer writes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderFields {
    fields: Vec<(String, String)>,
}

impl HeaderFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a header. An existing entry with the same name (ignoring case)
    /// keeps its position and takes the new value.
    ///
    /// Surrounding SP/HT is stripped from the value, as the parser does, so
    /// a stored value reads back unchanged after a wire round trip.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        let value = match value.trim_matches([' ', '\t']) {
            trimmed if trimmed.len() == value.len() => value,
            trimmed => trimmed.to_string(),
        };
        match self
            .fields
            .iter_mut()
            .find(|(key, _)| key.eq_ignore_ascii_case(&name))
        {
            Some(entry) => entry.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let pos = self
            .fields
            .iter()
            .position(|(key, _)| key.eq_ignore_ascii_case(name))?;
        Some(self.fields.remove(pos).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for HeaderFields {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut headers = HeaderFields::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_strips_surrounding_whitespace() {
        let mut headers = HeaderFields::new();
        headers.insert("Session", " S1\t ");
        assert_eq!(headers.get("Session"), Some("S1"));
    }

    #[test]
    fn insert_replaces_case_insensitively_in_place() {
        let mut headers = HeaderFields::new();
        headers.insert("Session", "a");
        headers.insert("Content-Type", "text/list");
        headers.insert("session", "b");

        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("SESSION"), Some("b"));
        let names: Vec<&str> = headers.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["Session", "Content-Type"]);
    }

    #[test]
    fn remove_returns_value() {
        let mut headers: HeaderFields = [("cseq", "3"), ("public", "LIST")].into_iter().collect();
        assert_eq!(headers.remove("CSeq").as_deref(), Some("3"));
        assert!(!headers.contains("cseq"));
        assert_eq!(headers.remove("cseq"), None);
    }
}
