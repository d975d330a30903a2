//! Minimal scanning of the flat XML feeds returned by arXiv and PubMed.
//!
//! Not a general parser: elements of the same name must not nest.

/// One `<tag ...>inner</tag>` occurrence.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Element<'a> {
    /// The opening tag, attributes included.
    pub open: &'a str,
    /// Raw text between the tags; empty for self-closing elements.
    pub inner: &'a str,
}

impl<'a> Element<'a> {
    pub fn attr(&self, name: &str) -> Option<&'a str> {
        let needle = format!(" {name}=\"");
        let start = self.open.find(&needle)? + needle.len();
        let len = self.open[start..].find('"')?;
        Some(&self.open[start..start + len])
    }

    /// Inner text with markup stripped, entities decoded and whitespace collapsed.
    pub fn text(&self) -> String {
        let decoded = decode_entities(&strip_tags(self.inner));
        decoded.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

/// Every `tag` element in `xml`, in document order.
pub(crate) fn elements<'a>(xml: &'a str, tag: &str) -> Vec<Element<'a>> {
    let open_prefix = format!("<{tag}");
    let close = format!("</{tag}>");
    let mut found = Vec::new();
    let mut from = 0;

    while let Some(pos) = xml[from..].find(&open_prefix) {
        let start = from + pos;
        let after = start + open_prefix.len();
        // <AbstractText> shares a prefix with <Abstract>
        let boundary = xml[after..].chars().next();
        if !matches!(boundary, Some(c) if c == '>' || c == '/' || c.is_whitespace()) {
            from = after;
            continue;
        }
        let Some(gt) = xml[after..].find('>') else {
            break;
        };
        let open_end = after + gt + 1;
        let open = &xml[start..open_end];
        if open.ends_with("/>") {
            found.push(Element { open, inner: "" });
            from = open_end;
            continue;
        }
        let Some(len) = xml[open_end..].find(&close) else {
            break;
        };
        found.push(Element {
            open,
            inner: &xml[open_end..open_end + len],
        });
        from = open_end + len + close.len();
    }
    found
}

pub(crate) fn first<'a>(xml: &'a str, tag: &str) -> Option<Element<'a>> {
    elements(xml, tag).into_iter().next()
}

/// Text of the first `tag` element, if present and non-empty.
pub(crate) fn first_text(xml: &str, tag: &str) -> Option<String> {
    first(xml, tag).map(|e| e.text()).filter(|t| !t.is_empty())
}

fn strip_tags(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_tag = false;
    for c in s.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

fn decode_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_sharing_tags_are_distinct() {
        let xml = r#"<Abstract><AbstractText Label="A">one</AbstractText><AbstractText>two</AbstractText></Abstract>"#;
        let abstracts = elements(xml, "Abstract");
        assert_eq!(abstracts.len(), 1);
        let parts = elements(abstracts[0].inner, "AbstractText");
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].attr("Label"), Some("A"));
        assert_eq!(parts[1].text(), "two");
    }

    #[test]
    fn test_self_closing_elements() {
        let xml = r#"<link href="http://arxiv.org/pdf/1" title="pdf"/><link href="x" />"#;
        let links = elements(xml, "link");
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].attr("href"), Some("http://arxiv.org/pdf/1"));
        assert_eq!(links[0].attr("title"), Some("pdf"));
        assert_eq!(links[1].inner, "");
    }

    #[test]
    fn test_text_strips_markup_and_decodes() {
        let xml = "<title>\n  Bone &amp; <i>mineral</i>\n density </title>";
        assert_eq!(first_text(xml, "title").as_deref(), Some("Bone & mineral density"));
        assert_eq!(first_text("<title> </title>", "title"), None);
        assert_eq!(first_text("<other/>", "title"), None);
    }
}
