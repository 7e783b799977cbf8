//! Structured document content as returned by the document store.
//!
//! Mirrors the shape of a Google Docs `documents.get` response closely enough
//! to deserialize it directly; only the parts the weekly job reads are kept.

use serde::{Deserialize, Serialize};

/// A document's title and structured body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentContent {
    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub body: DocumentBody,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentBody {
    #[serde(default)]
    pub content: Vec<StructuralElement>,
}

/// A body element; only paragraphs carry text we care about
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuralElement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paragraph: Option<Paragraph>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Paragraph {
    #[serde(default)]
    pub elements: Vec<ParagraphElement>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParagraphElement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_run: Option<TextRun>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextRun {
    #[serde(default)]
    pub content: String,
}

impl DocumentContent {
    /// Build a document whose body is one paragraph per line of `text`
    pub fn from_text(title: impl Into<String>, text: &str) -> Self {
        let content = text
            .split_inclusive('\n')
            .map(|line| StructuralElement {
                paragraph: Some(Paragraph {
                    elements: vec![ParagraphElement {
                        text_run: Some(TextRun {
                            content: line.to_string(),
                        }),
                    }],
                }),
            })
            .collect();

        Self {
            title: title.into(),
            body: DocumentBody { content },
        }
    }

    /// Every paragraph text run, in document order
    pub fn text_runs(&self) -> impl Iterator<Item = &str> {
        self.body
            .content
            .iter()
            .filter_map(|element| element.paragraph.as_ref())
            .flat_map(|paragraph| paragraph.elements.iter())
            .filter_map(|element| element.text_run.as_ref())
            .map(|run| run.content.as_str())
    }
}
