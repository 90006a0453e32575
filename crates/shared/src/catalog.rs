//! Destination catalog shown on the landing page, and the looping strip used to browse it.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Destination {
    pub id: u32,
    pub name: &'static str,
    pub description: &'static str,
    pub image: &'static str,
}

pub const DESTINATIONS: [Destination; 6] = [
    Destination {
        id: 1,
        name: "Sidi Bou Said",
        description: "Picturesque blue and white village overlooking the Mediterranean",
        image: "/assets/sidi-bou-said.jpg",
    },
    Destination {
        id: 2,
        name: "Sahara Desert",
        description: "Endless golden dunes and unforgettable desert adventures",
        image: "/assets/sahara-desert.jpg",
    },
    Destination {
        id: 3,
        name: "Carthage Ruins",
        description: "Ancient Roman archaeological site with rich historical heritage",
        image: "/assets/carthage-ruins.jpg",
    },
    Destination {
        id: 4,
        name: "Djerba Island",
        description: "Traditional crafts, beautiful beaches, and authentic culture",
        image: "/assets/djerba-island.jpg",
    },
    Destination {
        id: 5,
        name: "Mediterranean Coast",
        description: "Pristine beaches and crystal-clear turquoise waters",
        image: "/assets/coastal-beach.jpg",
    },
    Destination {
        id: 6,
        name: "Atlas Mountains",
        description: "Breathtaking mountain landscapes and scenic hiking trails",
        image: "/assets/nature-landscape.jpg",
    },
];

pub fn destinations() -> &'static [Destination] {
    &DESTINATIONS
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Viewport {
    Narrow,
    Medium,
    #[default]
    Wide,
}

impl Viewport {
    pub const ALL: [Viewport; 3] = [Viewport::Narrow, Viewport::Medium, Viewport::Wide];

    pub fn as_str(self) -> &'static str {
        match self {
            Viewport::Narrow => "narrow",
            Viewport::Medium => "medium",
            Viewport::Wide => "wide",
        }
    }

    pub fn cards_per_view(self) -> usize {
        match self {
            Viewport::Narrow => 1,
            Viewport::Medium => 2,
            Viewport::Wide => 3,
        }
    }
}

/// Looping strip over a fixed list of cards. Moving past either end wraps around.
#[derive(Debug, Clone)]
pub struct Showcase<'a, T> {
    items: &'a [T],
    position: usize,
}

impl<'a, T> Showcase<'a, T> {
    pub fn new(items: &'a [T]) -> Self {
        Self { items, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Jumps to `position`, wrapping past the end.
    pub fn seek(&mut self, position: usize) {
        if !self.items.is_empty() {
            self.position = position % self.items.len();
        }
    }

    pub fn next(&mut self) {
        if !self.items.is_empty() {
            self.position = (self.position + 1) % self.items.len();
        }
    }

    pub fn previous(&mut self) {
        if !self.items.is_empty() {
            self.position = (self.position + self.items.len() - 1) % self.items.len();
        }
    }

    /// Cards in view, starting at the current position. Never repeats a card.
    pub fn visible(&self, per_view: usize) -> Vec<&'a T> {
        let count = per_view.min(self.items.len());
        (0..count)
            .map(|offset| &self.items[(self.position + offset) % self.items.len()])
            .collect()
    }
}

impl Showcase<'static, Destination> {
    pub fn destinations() -> Self {
        Self::new(&DESTINATIONS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_order_is_fixed() {
        let names: Vec<_> = destinations().iter().map(|d| d.name).collect();
        assert_eq!(
            names,
            [
                "Sidi Bou Said",
                "Sahara Desert",
                "Carthage Ruins",
                "Djerba Island",
                "Mediterranean Coast",
                "Atlas Mountains",
            ]
        );
    }

    #[test]
    fn previous_from_start_wraps_to_last_card() {
        let mut showcase = Showcase::destinations();
        showcase.previous();
        assert_eq!(showcase.position(), 5);
        assert_eq!(showcase.visible(1)[0].name, "Atlas Mountains");
    }

    #[test]
    fn visible_window_wraps_around_the_end() {
        let mut showcase = Showcase::destinations();
        for _ in 0..5 {
            showcase.next();
        }
        let names: Vec<_> = showcase
            .visible(Viewport::Wide.cards_per_view())
            .iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, ["Atlas Mountains", "Sidi Bou Said", "Sahara Desert"]);
    }

    #[test]
    fn next_cycles_back_to_start() {
        let mut showcase = Showcase::destinations();
        for _ in 0..showcase.len() {
            showcase.next();
        }
        assert_eq!(showcase.position(), 0);
    }

    #[test]
    fn per_view_larger_than_catalog_shows_each_card_once() {
        let showcase = Showcase::new(&DESTINATIONS[..2]);
        assert_eq!(showcase.visible(3).len(), 2);
    }

    #[test]
    fn seek_wraps_out_of_range_positions() {
        let mut showcase = Showcase::destinations();
        showcase.seek(8);
        assert_eq!(showcase.position(), 2);
        assert_eq!(showcase.visible(1)[0].name, "Carthage Ruins");
    }
}
