use once_cell::sync::Lazy;
use regex::Regex;
use log::debug;

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("Invalid whitespace regex"));

/// Position of a fragment on the page, in PDF points (origin bottom-left)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FragmentBounds {
    pub left: f32,
    pub bottom: f32,
    pub right: f32,
    pub top: f32,
}

impl FragmentBounds {
    pub fn height(&self) -> f32 {
        (self.top - self.bottom).abs()
    }

    pub fn vertical_center(&self) -> f32 {
        (self.top + self.bottom) / 2.0
    }
}

/// A positioned piece of text as reported by the PDF engine
#[derive(Debug, Clone, PartialEq)]
pub struct TextFragment {
    pub text: String,
    pub bounds: Option<FragmentBounds>,
}

impl TextFragment {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            bounds: None,
        }
    }

    pub fn positioned(text: impl Into<String>, bounds: FragmentBounds) -> Self {
        Self {
            text: text.into(),
            bounds: Some(bounds),
        }
    }
}

/// One layout line: fragments sharing a baseline
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayoutLine {
    pub fragments: Vec<TextFragment>,
}

impl LayoutLine {
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fragments: texts.into_iter().map(TextFragment::new).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextBlock {
    pub lines: Vec<LayoutLine>,
}

/// Structured text of one rendered page: blocks, then lines, then fragments
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageLayout {
    pub blocks: Vec<TextBlock>,
}

impl PageLayout {
    /// Single-block page where every string is a one-fragment line
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let lines = lines
            .into_iter()
            .map(|line| LayoutLine {
                fragments: vec![TextFragment::new(line)],
            })
            .collect();
        Self {
            blocks: vec![TextBlock { lines }],
        }
    }
}

/// Turns page layouts into the ordered logical lines the record scan reads
///
/// Order is block order, then line order inside each block. Multi-column
/// pages are not re-sorted into reading order.
pub struct LineExtractor;

impl LineExtractor {
    /// Logical lines of one page
    ///
    /// Each layout line becomes the concatenation of its fragment texts with
    /// whitespace runs collapsed to a single space. Empty results are dropped.
    pub fn extract_lines(page: &PageLayout) -> Vec<String> {
        page.blocks
            .iter()
            .flat_map(|block| block.lines.iter())
            .filter_map(|line| {
                let joined: String = line.fragments.iter().map(|f| f.text.as_str()).collect();
                let collapsed = collapse_whitespace(&joined);
                (!collapsed.is_empty()).then_some(collapsed)
            })
            .collect()
    }

    /// Logical lines of a whole document, pages in order
    pub fn extract_document_lines(pages: &[PageLayout]) -> Vec<String> {
        let mut lines = Vec::new();
        for (index, page) in pages.iter().enumerate() {
            let page_lines = Self::extract_lines(page);
            debug!("Page {} produced {} logical lines", index + 1, page_lines.len());
            lines.extend(page_lines);
        }
        lines
    }
}

pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE_RUN.replace_all(text, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragments_join_into_one_line() {
        let page = PageLayout {
            blocks: vec![TextBlock {
                lines: vec![
                    LayoutLine::from_texts(["CNPJ: ", "01.234.567/0001-89", "  -   MUNICIPIO"]),
                    LayoutLine::from_texts(["   ", "\t"]),
                    LayoutLine::from_texts(["DEVEDOR"]),
                ],
            }],
        };
        let lines = LineExtractor::extract_lines(&page);
        assert_eq!(lines, vec!["CNPJ: 01.234.567/0001-89 - MUNICIPIO", "DEVEDOR"]);
    }

    #[test]
    fn test_block_order_is_preserved() {
        let page = PageLayout {
            blocks: vec![
                TextBlock {
                    lines: vec![LayoutLine::from_texts(["right column"])],
                },
                TextBlock {
                    lines: vec![
                        LayoutLine::from_texts(["left", " column"]),
                        LayoutLine::from_texts(["second"]),
                    ],
                },
            ],
        };
        let lines = LineExtractor::extract_lines(&page);
        assert_eq!(lines, vec!["right column", "left column", "second"]);
    }

    #[test]
    fn test_document_lines_concatenate_pages() {
        let pages = vec![
            PageLayout::from_lines(["a", "b"]),
            PageLayout::default(),
            PageLayout::from_lines(["  c  "]),
        ];
        assert_eq!(LineExtractor::extract_document_lines(&pages), vec!["a", "b", "c"]);
    }
}
