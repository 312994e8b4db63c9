//! Reading statistics: word count, reading time.

use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use crate::document::{Block, Document};

/// Average silent reading speed.
const WORDS_PER_MINUTE: f32 = 200.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentStats {
    pub word_count: u64,
    pub character_count: u64,
    pub chapter_count: u32,
    pub image_count: u32,
    pub estimated_reading_time_minutes: f32,
}

impl Document {
    pub fn stats(&self) -> DocumentStats {
        block_stats(&self.blocks)
    }
}

pub fn block_stats(blocks: &[Block]) -> DocumentStats {
    let mut word_count: u64 = 0;
    let mut character_count: u64 = 0;
    let mut chapter_count: u32 = 0;
    let mut image_count: u32 = 0;

    for block in blocks {
        match block {
            Block::Text(t) => {
                word_count += t.text.unicode_words().count() as u64;
                character_count += t.text.chars().filter(|c| !c.is_whitespace()).count() as u64;
            }
            Block::Chapter(_) => chapter_count += 1,
            Block::Image(_) => image_count += 1,
            Block::Separator => {}
        }
    }

    DocumentStats {
        word_count,
        character_count,
        chapter_count,
        image_count,
        estimated_reading_time_minutes: word_count as f32 / WORDS_PER_MINUTE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Chapter, ImageRef, TextBlock};

    #[test]
    fn test_block_stats() {
        let blocks = vec![
            Block::Chapter(Chapter {
                title: "One".into(),
                nested: false,
            }),
            Block::Text(TextBlock::paragraph("The quick (brown) fox — jumps.")),
            Block::Image(ImageRef {
                entry: "a.png".into(),
                alt: None,
            }),
            Block::Separator,
            Block::Text(TextBlock::paragraph("Über naïve café")),
        ];
        let stats = block_stats(&blocks);
        assert_eq!(stats.word_count, 8);
        assert_eq!(stats.chapter_count, 1);
        assert_eq!(stats.image_count, 1);
        assert_eq!(stats.character_count, 25 + 13);
        assert!((stats.estimated_reading_time_minutes - 8.0 / 200.0).abs() < 1e-6);
    }
}
