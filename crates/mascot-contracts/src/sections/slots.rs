use std::fmt;

use crate::media::EncodedImage;

/// Fixed role of an image once it is placed on the website.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageSlot {
    Hero,
    About,
    Buy,
    Tokenomics,
}

impl ImageSlot {
    pub const ALL: [ImageSlot; 4] = [
        ImageSlot::Hero,
        ImageSlot::About,
        ImageSlot::Buy,
        ImageSlot::Tokenomics,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        match self {
            ImageSlot::Hero => 0,
            ImageSlot::About => 1,
            ImageSlot::Buy => 2,
            ImageSlot::Tokenomics => 3,
        }
    }
}

impl fmt::Display for ImageSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ImageSlot::Hero => "hero",
            ImageSlot::About => "about",
            ImageSlot::Buy => "buy",
            ImageSlot::Tokenomics => "tokenomics",
        };
        f.write_str(label)
    }
}

/// Clones the chosen image into one independent copy per slot.
pub fn distribute_slots(selected: &EncodedImage) -> Vec<EncodedImage> {
    ImageSlot::ALL.iter().map(|_| selected.clone()).collect()
}
