//! Server address lists.

/// Ordered list of configuration-server addresses.
///
/// Addresses are `host:port` or URL strings. The list is replaced wholesale on
/// every successful resolution and never partially mutated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerAddressList(Vec<String>);

impl ServerAddressList {
    /// Creates a list from already-cleaned addresses.
    pub fn new(addresses: Vec<String>) -> Self {
        Self(addresses)
    }

    /// Parses a newline-separated body.
    ///
    /// Each line is trimmed and blank lines are dropped. Order is preserved
    /// and duplicates are kept.
    pub fn parse(text: &str) -> Self {
        Self(
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    /// Renders the list one address per line, with a trailing newline.
    pub fn to_lines(&self) -> String {
        let mut out = String::new();
        for address in &self.0 {
            out.push_str(address);
            out.push('\n');
        }
        out
    }

    /// Returns true if there are no addresses.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of addresses.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates addresses in order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Returns the addresses as a slice.
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl<'a> IntoIterator for &'a ServerAddressList {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Returns the base URL for a server address.
///
/// Bare `host:port` addresses get an `http://` scheme; trailing slashes are
/// removed.
pub fn base_url(address: &str) -> String {
    let address = address.trim_end_matches('/');
    if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    }
}
