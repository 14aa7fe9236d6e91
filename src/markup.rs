//! Minimal tag scanning over portal markup.
//!
//! The portal emits loosely formed HTML (unquoted attributes, unclosed
//! containers, `&nbsp;` padding), so this walks tags directly instead of
//! building a DOM. Tag and attribute names compare ASCII case-insensitively.

const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "wbr",
];

const COMMENT: &str = "!--";

#[derive(Debug, Clone)]
struct Tag<'a> {
    start: usize,
    end: usize,
    name: String,
    attrs: &'a str,
    closing: bool,
    self_closing: bool,
}

/// One element located in the markup.
#[derive(Debug, Clone, Copy)]
pub struct Element<'a> {
    pub attrs: &'a str,
    pub inner: &'a str,
}

fn tag_at(s: &str, start: usize) -> Option<Tag<'_>> {
    let bytes = s.as_bytes();
    let mut i = start + 1;
    let closing = bytes.get(i) == Some(&b'/');
    if closing {
        i += 1;
    }
    let name_start = i;
    while i < bytes.len() && bytes[i].is_ascii_alphanumeric() {
        i += 1;
    }
    if i == name_start || !bytes[name_start].is_ascii_alphabetic() {
        return None;
    }
    let name = s[name_start..i].to_ascii_lowercase();
    let end = s[i..].find('>')? + i + 1;
    let attrs = s[i..end - 1].trim();
    let self_closing = attrs.ends_with('/') || VOID_TAGS.contains(&name.as_str());
    Some(Tag {
        start,
        end,
        name,
        attrs: attrs.trim_end_matches('/').trim(),
        closing,
        self_closing,
    })
}

fn scan_tags(s: &str) -> Vec<Tag<'_>> {
    let mut tags = Vec::new();
    let mut pos = 0usize;
    while let Some(rel) = s[pos..].find('<') {
        let start = pos + rel;
        if s[start..].starts_with("<!--") {
            let end = match s[start..].find("-->") {
                Some(end) => start + end + 3,
                None => s.len(),
            };
            tags.push(Tag {
                start,
                end,
                name: COMMENT.to_string(),
                attrs: "",
                closing: false,
                self_closing: true,
            });
            pos = end;
            continue;
        }
        match tag_at(s, start) {
            Some(tag) => {
                pos = tag.end;
                tags.push(tag);
            }
            None => pos = start + 1,
        }
    }
    tags
}

fn matching_close(tags: &[Tag<'_>], open_idx: usize) -> Option<usize> {
    let name = &tags[open_idx].name;
    let mut depth = 0usize;
    for (idx, tag) in tags.iter().enumerate().skip(open_idx + 1) {
        if &tag.name != name {
            continue;
        }
        if tag.closing {
            if depth == 0 {
                return Some(idx);
            }
            depth -= 1;
        } else if !tag.self_closing {
            depth += 1;
        }
    }
    None
}

/// Value of an attribute, quoted or not.
pub fn attr_value(attrs: &str, name: &str) -> Option<String> {
    let lc = attrs.to_ascii_lowercase();
    let name = name.to_ascii_lowercase();
    let mut from = 0usize;
    while let Some(rel) = lc[from..].find(&name) {
        let at = from + rel;
        from = at + name.len();
        let boundary = at == 0 || {
            let prev = lc.as_bytes()[at - 1];
            !prev.is_ascii_alphanumeric() && prev != b'-'
        };
        if !boundary {
            continue;
        }
        let rest = attrs[from..].trim_start();
        let Some(rest) = rest.strip_prefix('=') else {
            continue;
        };
        let rest = rest.trim_start();
        let value = match rest.chars().next() {
            Some(q @ ('"' | '\'')) => {
                let body = &rest[1..];
                &body[..body.find(q).unwrap_or(body.len())]
            }
            _ => {
                let end = rest
                    .find(|c: char| c.is_whitespace() || c == '>')
                    .unwrap_or(rest.len());
                &rest[..end]
            }
        };
        return Some(value.to_string());
    }
    None
}

pub fn has_class(attrs: &str, class: &str) -> bool {
    attr_value(attrs, "class")
        .map(|v| v.split_whitespace().any(|c| c.eq_ignore_ascii_case(class)))
        .unwrap_or(false)
}

/// Outermost elements matching `tag` (any tag when `None`) and carrying `class`
/// (any class when `None`). An element with no closing tag runs up to the next
/// match, or to the end of the input.
pub fn elements<'a>(s: &'a str, tag: Option<&str>, class: Option<&str>) -> Vec<Element<'a>> {
    let tags = scan_tags(s);
    let matches = |t: &Tag<'_>| {
        !t.closing
            && t.name != COMMENT
            && tag.map_or(true, |name| t.name.eq_ignore_ascii_case(name))
            && class.map_or(true, |c| has_class(t.attrs, c))
    };

    let mut out = Vec::new();
    let mut idx = 0usize;
    while idx < tags.len() {
        let open = &tags[idx];
        if !matches(open) {
            idx += 1;
            continue;
        }
        if open.self_closing {
            out.push(Element {
                attrs: open.attrs,
                inner: "",
            });
            idx += 1;
            continue;
        }
        match matching_close(&tags, idx) {
            Some(close_idx) => {
                out.push(Element {
                    attrs: open.attrs,
                    inner: &s[open.end..tags[close_idx].start],
                });
                idx = close_idx + 1;
            }
            None => {
                let next = tags
                    .iter()
                    .enumerate()
                    .skip(idx + 1)
                    .find(|(_, t)| matches(t))
                    .map(|(i, t)| (i, t.start));
                let (next_idx, end) = next.unwrap_or((tags.len(), s.len()));
                out.push(Element {
                    attrs: open.attrs,
                    inner: &s[open.end..end],
                });
                idx = next_idx;
            }
        }
    }
    out
}

pub fn first_element<'a>(
    s: &'a str,
    tag: Option<&str>,
    class: Option<&str>,
) -> Option<Element<'a>> {
    elements(s, tag, class).into_iter().next()
}

pub fn normalize_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&#160;", " ")
        .replace("&#xa0;", " ")
        .replace('\u{a0}', " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Collapse every whitespace run (non-breaking spaces included) to one space.
pub fn normalize_ws(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_space = false;
    for ch in s.chars() {
        if ch.is_whitespace() {
            if !prev_space {
                out.push(' ');
                prev_space = true;
            }
        } else {
            out.push(ch);
            prev_space = false;
        }
    }
    out.trim().to_string()
}

fn strip_tags_raw(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last = 0usize;
    for tag in scan_tags(s) {
        out.push_str(&s[last..tag.start]);
        out.push(' ');
        last = tag.end;
    }
    out.push_str(&s[last..]);
    out
}

/// Visible text of a fragment on a single normalized line.
pub fn text(s: &str) -> String {
    normalize_ws(&normalize_entities(&strip_tags_raw(s)))
}

/// Split a fragment on `<br>` markers and return the text of each part.
pub fn split_on_breaks(s: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut last = 0usize;
    for tag in scan_tags(s) {
        if tag.name == "br" {
            parts.push(text(&s[last..tag.start]));
            last = tag.end;
        }
    }
    parts.push(text(&s[last..]));
    parts
}

const LINE_BREAKING: &[&str] = &[
    "br", "li", "p", "div", "tr", "dt", "dd", "h1", "h2", "h3", "h4", "h5", "h6",
];

/// Visible text of a fragment split into non-empty normalized lines, breaking
/// at `<br>` and at block-level element boundaries. Newlines in the source are
/// plain whitespace.
pub fn text_lines(s: &str) -> Vec<String> {
    let mut raw = String::with_capacity(s.len());
    let mut last = 0usize;
    let push_text = |raw: &mut String, chunk: &str| {
        raw.extend(chunk.chars().map(|c| if c == '\n' || c == '\r' { ' ' } else { c }));
    };
    for tag in scan_tags(s) {
        push_text(&mut raw, &s[last..tag.start]);
        raw.push(if LINE_BREAKING.contains(&tag.name.as_str()) {
            '\n'
        } else {
            ' '
        });
        last = tag.end;
    }
    push_text(&mut raw, &s[last..]);

    raw.split('\n')
        .map(|line| normalize_ws(&normalize_entities(line)))
        .filter(|line| !line.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_quoted_and_bare_attributes() {
        assert_eq!(
            attr_value(r#"id="x" class="card subject-card""#, "class").as_deref(),
            Some("card subject-card")
        );
        assert_eq!(attr_value("class=teamroster border=0", "class").as_deref(), Some("teamroster"));
        assert_eq!(attr_value("data-class='x'", "class"), None);
        assert!(has_class(r#"class="Card SUBJECT-card""#, "subject-card"));
    }

    #[test]
    fn nested_elements_close_at_the_right_depth() {
        let html = r#"<div class="card"><div>inner</div><span>tail</span></div><div class="card">two</div>"#;
        let found = elements(html, Some("div"), Some("card"));
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].inner, "<div>inner</div><span>tail</span>");
        assert_eq!(found[1].inner, "two");
    }

    #[test]
    fn unclosed_element_runs_to_next_match() {
        let html = r#"<li class="s">one<li class="s">two</li>"#;
        let found = elements(html, Some("li"), Some("s"));
        assert_eq!(found.len(), 2);
        assert_eq!(text(found[0].inner), "one");
        assert_eq!(text(found[1].inner), "two");
    }

    #[test]
    fn text_normalizes_entities_and_spacing() {
        assert_eq!(text("<b>Teacher</b>&nbsp;:\u{a0}\u{a0}Jane   Doe"), "Teacher : Jane Doe");
        assert_eq!(text("A &amp; B <!-- <b>hidden</b> -->"), "A & B");
    }

    #[test]
    fn splits_on_any_break_spelling() {
        assert_eq!(
            split_on_breaks("Data Structures<br>CS201<BR/>x<br />y"),
            vec!["Data Structures", "CS201", "x", "y"]
        );
    }

    #[test]
    fn block_boundaries_become_lines() {
        let lines = text_lines("<ul><li>Teacher: A</li><li> Absent :\n 3 </li></ul><p></p>Last<br>line");
        assert_eq!(lines, vec!["Teacher: A", "Absent : 3", "Last", "line"]);
    }
}
