//! Mustache parser
//!
//! Turns source text into a node tree. Standalone lines (a section, inverted,
//! closing, comment, partial or set-delimiter tag alone on its line) are
//! dropped from the output, and a standalone partial remembers the
//! indentation it was written with.

use crate::error::{Result, ViewError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Node {
    Text(String),
    Variable {
        name: String,
        escape: bool,
    },
    Section {
        name: String,
        inverted: bool,
        children: Vec<Node>,
        /// Unparsed body, handed to lambdas
        raw: String,
        /// Delimiters in effect at the opening tag
        delimiters: (String, String),
    },
    Partial {
        name: String,
        indent: String,
    },
}

#[derive(Debug)]
pub(crate) struct Parsed {
    pub(crate) nodes: Vec<Node>,
    /// Referenced partial names, deduplicated in first-use order
    pub(crate) partials: Vec<String>,
}

pub(crate) fn parse(label: &str, source: &str, open: &str, close: &str) -> Result<Parsed> {
    let mut parser = Parser {
        label,
        source,
        open: open.to_string(),
        close: close.to_string(),
        pos: 0,
        root: Vec::new(),
        sections: Vec::new(),
        partials: Vec::new(),
    };
    parser.run()?;

    Ok(Parsed {
        nodes: parser.root,
        partials: parser.partials,
    })
}

enum Tag<'s> {
    Variable(&'s str, bool),
    Section(&'s str, bool),
    Close(&'s str),
    Partial(&'s str),
    Comment,
    Delimiters(String, String),
}

impl Tag<'_> {
    fn may_stand_alone(&self) -> bool {
        !matches!(self, Tag::Variable(..))
    }
}

struct OpenSection {
    name: String,
    inverted: bool,
    children: Vec<Node>,
    body_start: usize,
    delimiters: (String, String),
}

struct Parser<'s> {
    label: &'s str,
    source: &'s str,
    open: String,
    close: String,
    pos: usize,
    root: Vec<Node>,
    sections: Vec<OpenSection>,
    partials: Vec<String>,
}

impl<'s> Parser<'s> {
    fn run(&mut self) -> Result<()> {
        let source = self.source;

        while let Some(offset) = source[self.pos..].find(self.open.as_str()) {
            let tag_start = self.pos + offset;
            let (tag, tag_end) = self.read_tag(tag_start)?;

            let (text_end, next, indent) = match self.standalone(&tag, tag_start, tag_end) {
                Some((line_start, line_end)) => {
                    (line_start, line_end, &source[line_start..tag_start])
                }
                None => (tag_start, tag_end, ""),
            };

            self.push_text(self.pos, text_end.max(self.pos));
            self.pos = next;
            self.apply(tag, tag_start, tag_end, indent)?;
        }
        self.push_text(self.pos, source.len());

        match self.sections.last() {
            Some(section) => Err(self.error(format!("unclosed section {:?}", section.name))),
            None => Ok(()),
        }
    }

    fn read_tag(&self, tag_start: usize) -> Result<(Tag<'s>, usize)> {
        let source = self.source;
        let inner_start = tag_start + self.open.len();
        let rest = &source[inner_start..];

        if let Some(body) = rest.strip_prefix('{') {
            let closing = format!("}}{}", self.close);
            let end = body.find(&closing).ok_or_else(|| self.unclosed(tag_start))?;
            let name = self.name(&body[..end])?;
            return Ok((Tag::Variable(name, false), inner_start + 1 + end + closing.len()));
        }

        if let Some(body) = rest.strip_prefix('=') {
            let closing = format!("={}", self.close);
            let end = body.find(&closing).ok_or_else(|| self.unclosed(tag_start))?;
            let mut parts = body[..end].split_whitespace();
            let tag = match (parts.next(), parts.next(), parts.next()) {
                (Some(open), Some(close), None) if !open.contains('=') && !close.contains('=') => {
                    Tag::Delimiters(open.to_string(), close.to_string())
                }
                _ => {
                    return Err(self.error(format!(
                        "invalid set-delimiter tag {:?}",
                        &body[..end]
                    )))
                }
            };
            return Ok((tag, inner_start + 1 + end + closing.len()));
        }

        let end = rest.find(self.close.as_str()).ok_or_else(|| self.unclosed(tag_start))?;
        let content = rest[..end].trim();
        let tag_end = inner_start + end + self.close.len();

        let tag = match content.chars().next() {
            Some('!') => Tag::Comment,
            Some('#') => Tag::Section(self.name(&content[1..])?, false),
            Some('^') => Tag::Section(self.name(&content[1..])?, true),
            Some('/') => Tag::Close(self.name(&content[1..])?),
            Some('>') => Tag::Partial(self.name(&content[1..])?),
            Some('&') => Tag::Variable(self.name(&content[1..])?, false),
            _ => Tag::Variable(self.name(content)?, true),
        };
        Ok((tag, tag_end))
    }

    /// Line bounds to drop when `tag` stands alone on its line
    ///
    /// Returns the start of the line and the position just past its newline
    /// (or the end of the source).
    fn standalone(&self, tag: &Tag<'_>, tag_start: usize, tag_end: usize) -> Option<(usize, usize)> {
        if !tag.may_stand_alone() {
            return None;
        }

        let source = self.source;
        let line_start = source[..tag_start].rfind('\n').map_or(0, |i| i + 1);
        if !is_blank(&source[line_start..tag_start]) {
            return None;
        }

        let rest = &source[tag_end..];
        let (line, next) = match rest.find('\n') {
            Some(i) => (&rest[..i], tag_end + i + 1),
            None => (rest, source.len()),
        };
        if !is_blank(line.strip_suffix('\r').unwrap_or(line)) {
            return None;
        }

        Some((line_start, next))
    }

    fn apply(&mut self, tag: Tag<'s>, tag_start: usize, tag_end: usize, indent: &str) -> Result<()> {
        match tag {
            Tag::Comment => {}
            Tag::Delimiters(open, close) => {
                self.open = open;
                self.close = close;
            }
            Tag::Variable(name, escape) => self.push(Node::Variable {
                name: name.to_string(),
                escape,
            }),
            Tag::Partial(name) => {
                if !self.partials.iter().any(|known| known == name) {
                    self.partials.push(name.to_string());
                }
                self.push(Node::Partial {
                    name: name.to_string(),
                    indent: indent.to_string(),
                });
            }
            Tag::Section(name, inverted) => self.sections.push(OpenSection {
                name: name.to_string(),
                inverted,
                children: Vec::new(),
                body_start: tag_end,
                delimiters: (self.open.clone(), self.close.clone()),
            }),
            Tag::Close(name) => {
                let section = self
                    .sections
                    .pop()
                    .ok_or_else(|| self.error(format!("closing tag {:?} without a section", name)))?;
                if section.name != name {
                    return Err(self.error(format!(
                        "section {:?} closed by {:?}",
                        section.name, name
                    )));
                }
                let raw = self.source[section.body_start..tag_start].to_string();
                self.push(Node::Section {
                    name: section.name,
                    inverted: section.inverted,
                    children: section.children,
                    raw,
                    delimiters: section.delimiters,
                });
            }
        }
        Ok(())
    }

    fn push(&mut self, node: Node) {
        match self.sections.last_mut() {
            Some(section) => section.children.push(node),
            None => self.root.push(node),
        }
    }

    fn push_text(&mut self, start: usize, end: usize) {
        if start < end {
            self.push(Node::Text(self.source[start..end].to_string()));
        }
    }

    fn name(&self, raw: &'s str) -> Result<&'s str> {
        let name = raw.trim();
        if name.is_empty() {
            return Err(self.error("empty tag"));
        }
        Ok(name)
    }

    fn unclosed(&self, tag_start: usize) -> ViewError {
        self.error(format!(
            "unclosed tag at byte {}, expected {:?}",
            tag_start, self.close
        ))
    }

    fn error(&self, message: impl Into<String>) -> ViewError {
        ViewError::compile(self.label, message)
    }
}

fn is_blank(text: &str) -> bool {
    text.chars().all(|c| c == ' ' || c == '\t')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes(source: &str) -> Vec<Node> {
        parse("test", source, "{{", "}}").unwrap().nodes
    }

    fn text(text: &str) -> Node {
        Node::Text(text.to_string())
    }

    #[test]
    fn test_tags() {
        assert_eq!(
            nodes("a{{x}}{{{y}}}{{& z}}{{! note }}"),
            vec![
                text("a"),
                Node::Variable { name: "x".into(), escape: true },
                Node::Variable { name: "y".into(), escape: false },
                Node::Variable { name: "z".into(), escape: false },
            ]
        );
    }

    #[test]
    fn test_sections_nest_and_keep_raw_body() {
        let parsed = nodes("{{#list}}<{{name}}>{{^empty}}none{{/empty}}{{/list}}");
        let Node::Section { name, inverted, children, raw, .. } = &parsed[0] else {
            panic!("expected a section");
        };
        assert_eq!(name, "list");
        assert!(!inverted);
        assert_eq!(raw, "<{{name}}>{{^empty}}none{{/empty}}");
        assert!(matches!(&children[2], Node::Section { inverted: true, .. }));
    }

    #[test]
    fn test_standalone_lines_are_dropped() {
        let parsed = nodes("begin\n  {{#a}}\nin\n  {{/a}}\nend\n");
        assert_eq!(parsed[0], text("begin\n"));
        let Node::Section { children, .. } = &parsed[1] else {
            panic!("expected a section");
        };
        assert_eq!(children, &vec![text("in\n")]);
        assert_eq!(parsed[2], text("end\n"));
    }

    #[test]
    fn test_inline_sections_keep_whitespace() {
        let parsed = nodes(" {{#a}}x{{/a}} \n");
        assert_eq!(parsed[0], text(" "));
        assert_eq!(parsed[2], text(" \n"));
    }

    #[test]
    fn test_standalone_partial_records_indent() {
        let parsed = parse("test", "list:\n  {{> item}}\n{{> item}}", "{{", "}}").unwrap();
        assert_eq!(parsed.partials, vec!["item".to_string()]);
        assert_eq!(
            parsed.nodes[1],
            Node::Partial { name: "item".into(), indent: "  ".into() }
        );
        assert_eq!(
            parsed.nodes[2],
            Node::Partial { name: "item".into(), indent: String::new() }
        );
    }

    #[test]
    fn test_set_delimiters() {
        let parsed = parse("test", "{{=<% %>=}}<% name %> {{literal}} <%> nav %>", "{{", "}}")
            .unwrap();
        assert_eq!(parsed.partials, vec!["nav".to_string()]);
        assert_eq!(
            parsed.nodes[0],
            Node::Variable { name: "name".into(), escape: true }
        );
        assert_eq!(parsed.nodes[1], text(" {{literal}} "));
    }

    #[test]
    fn test_initial_delimiters() {
        let parsed = parse("test", "[<%x%>]", "<%", "%>").unwrap();
        assert_eq!(parsed.nodes[1], Node::Variable { name: "x".into(), escape: true });
    }

    #[test]
    fn test_crlf_standalone() {
        let parsed = nodes("a\r\n{{! c }}\r\nb");
        assert_eq!(parsed, vec![text("a\r\n"), text("b")]);
    }

    #[test]
    fn test_errors() {
        for source in [
            "{{#a}}open",
            "{{/a}}",
            "{{#a}}{{/b}}",
            "{{name",
            "{{}}",
            "{{=<%=}}",
        ] {
            assert!(
                matches!(parse("bad", source, "{{", "}}"), Err(ViewError::Compile { .. })),
                "{:?} should not compile",
                source
            );
        }
    }
}
