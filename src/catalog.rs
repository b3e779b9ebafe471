//! The invention catalog and the per-game draw policy.
//!
//! A [`Catalog`] is an immutable, non-empty table of [`InventionFact`]s.
//! Items are addressed by [`ItemId`], their index in the table. An
//! [`ItemDeck`] remembers which ids a game has shown and draws the next one.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::error::{GameError, GameResult};
use crate::rng::Rng;

/// Year the wheel was invented, used as a reference point in round results.
pub const WHEEL_YEAR: i64 = -3500;

/// A single catalog entry.
///
/// Negative years are BCE. There is no year-zero correction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct InventionFact {
    /// Display name of the invention.
    pub name: String,
    /// Year of invention.
    pub year: i64,
    /// Short trivia shown with the results.
    pub fun_fact: String,
}

impl InventionFact {
    /// Creates a new entry.
    #[must_use]
    pub fn new(name: impl Into<String>, year: i64, fun_fact: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            year,
            fun_fact: fun_fact.into(),
        }
    }

    /// Returns true if this invention is older than the wheel.
    #[must_use]
    pub const fn predates_wheel(&self) -> bool {
        self.year < WHEEL_YEAR
    }
}

impl fmt::Display for InventionFact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, format_year(self.year))
    }
}

/// Formats a year as `"N BCE"` for negative years and `"N CE"` otherwise.
///
/// ```
/// use year_duel::catalog::format_year;
///
/// assert_eq!(format_year(-3500), "3500 BCE");
/// assert_eq!(format_year(1948), "1948 CE");
/// assert_eq!(format_year(0), "0 CE");
/// ```
#[must_use]
pub fn format_year(year: i64) -> String {
    if year < 0 {
        format!("{} BCE", year.unsigned_abs())
    } else {
        format!("{} CE", year)
    }
}

/// Index of an entry in a [`Catalog`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct ItemId(pub usize);

/// An immutable, non-empty list of inventions. Cloning is cheap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    items: Arc<[InventionFact]>,
}

impl Catalog {
    /// Creates a catalog from a list of entries.
    ///
    /// # Errors
    /// Returns [`GameError::EmptyCatalog`] if `items` is empty.
    pub fn new(items: Vec<InventionFact>) -> GameResult<Self> {
        if items.is_empty() {
            return Err(GameError::EmptyCatalog);
        }
        Ok(Self {
            items: items.into(),
        })
    }

    /// The built-in sample catalog.
    #[must_use]
    pub fn builtin() -> Self {
        let items: Vec<InventionFact> = BUILTIN
            .iter()
            .map(|&(name, year, fact)| InventionFact::new(name, year, fact))
            .collect();
        Self {
            items: items.into(),
        }
    }

    /// Number of entries. Always at least one.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Always false; present for API symmetry with [`Catalog::len`].
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Looks up an entry.
    #[must_use]
    pub fn get(&self, id: ItemId) -> Option<&InventionFact> {
        self.items.get(id.0)
    }

    /// Iterates over all entries with their ids.
    pub fn iter(&self) -> impl Iterator<Item = (ItemId, &InventionFact)> {
        self.items
            .iter()
            .enumerate()
            .map(|(index, item)| (ItemId(index), item))
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Tracks which catalog entries a game has already shown.
///
/// Draws are uniform over the unused ids. Once every id has been used the
/// deck is cleared and the draw is uniform over the whole catalog, so an
/// immediate repeat is possible and the game never stalls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemDeck {
    used: BTreeSet<ItemId>,
}

impl ItemDeck {
    /// Creates an empty deck.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Draws the next item and marks it used.
    pub fn draw<R: Rng + ?Sized>(&mut self, catalog: &Catalog, rng: &mut R) -> ItemId {
        let unused: SmallVec<[ItemId; 32]> = catalog
            .iter()
            .map(|(id, _)| id)
            .filter(|id| !self.used.contains(id))
            .collect();

        let id = if unused.is_empty() {
            self.used.clear();
            ItemId(rng.gen_range_usize(0..catalog.len()))
        } else {
            let pick = rng.gen_range_usize(0..unused.len());
            unused.get(pick).copied().unwrap_or(ItemId(0))
        };
        self.used.insert(id);
        id
    }

    /// Ids drawn since the last reset or exhaustion.
    pub fn used(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.used.iter().copied()
    }

    /// Number of ids currently marked used.
    #[must_use]
    pub fn used_count(&self) -> usize {
        self.used.len()
    }

    /// Returns true if `id` has been drawn since the last reset or exhaustion.
    #[must_use]
    pub fn is_used(&self, id: ItemId) -> bool {
        self.used.contains(&id)
    }

    /// Forgets every draw.
    pub fn clear(&mut self) {
        self.used.clear();
    }
}

const BUILTIN: &[(&str, i64, &str)] = &[
    (
        "Makeup",
        -4000,
        "Ancient Egyptians wore kohl made from lead and copper, which protected their eyes from the desert sun and fought infection.",
    ),
    (
        "Beer",
        -5000,
        "Mesopotamian workers were often paid in beer rations, up to four liters a day for heavy labor.",
    ),
    (
        "Dental Fillings",
        -6500,
        "The oldest known filling, found in Slovenia, was made of beeswax.",
    ),
    (
        "Surgery",
        -6500,
        "Stone-age surgeons performed trepanation with stone tools, and healed bone shows many patients survived.",
    ),
    (
        "Perfume",
        -4000,
        "The oldest known perfume workshop, on Cyprus, blended almond, pine, coriander and bergamot.",
    ),
    (
        "Soap",
        -2800,
        "Babylonian clay tablets record a soap recipe of animal fat and ash.",
    ),
    (
        "Wine",
        -7000,
        "The oldest wine residue was found in Georgia, in jars buried underground to keep them cool.",
    ),
    (
        "Tattoos",
        -5000,
        "Otzi the Iceman carried 61 tattoos, many placed over joints that likely ached.",
    ),
    (
        "Mirrors",
        -6000,
        "The first mirrors were polished obsidian from Anatolia.",
    ),
    (
        "Chewing Gum",
        -5000,
        "Neolithic people chewed birch bark tar, and lumps with tooth marks still survive.",
    ),
    (
        "Can Opener",
        1858,
        "Canned food arrived in 1810; for 48 years people opened cans with hammers and chisels.",
    ),
    (
        "Toilet Paper",
        1857,
        "Before toilet paper, people made do with wool, corn cobs, leaves or smooth stones.",
    ),
    (
        "Matches",
        1827,
        "Early friction matches could ignite from the warmth of a pocket.",
    ),
    (
        "Fork",
        1000,
        "When forks reached medieval Europe, some clergy denounced them as needless luxury.",
    ),
    (
        "Pillow",
        -7000,
        "Ancient Egyptian headrests were carved from stone or wood.",
    ),
    (
        "Umbrella",
        -2000,
        "For centuries umbrellas were considered a women's accessory in Europe.",
    ),
    (
        "Shoelaces",
        -8000,
        "A laced leather shoe found in an Armenian cave had been stuffed with grass.",
    ),
    (
        "Sunglasses",
        1929,
        "Inuit snow goggles cut glare with thin slits long before sunglasses were mass-produced in 1929.",
    ),
    (
        "Flush Toilet",
        1596,
        "Sir John Harington built a flush toilet for Elizabeth I, but without a water trap it smelled.",
    ),
    (
        "Lightbulb",
        1879,
        "Edison's first successful bulb burned for 13.5 hours after thousands of filament trials.",
    ),
    (
        "Bicycle",
        1817,
        "The first bicycle had no pedals; riders pushed off the ground with their feet.",
    ),
    (
        "Zipper",
        1893,
        "The zipper began life as the 'clasp locker' and took decades to catch on.",
    ),
    (
        "Safety Pin",
        1849,
        "Walter Hunt invented the safety pin in an afternoon to pay off a fifteen-dollar debt.",
    ),
    (
        "Aspirin",
        1897,
        "The name comes from spiraea, the plant its active ingredient was first drawn from.",
    ),
    (
        "Velcro",
        1948,
        "George de Mestral got the idea from burrs stuck in his dog's fur.",
    ),
    (
        "Post-it Notes",
        1968,
        "The adhesive came from a failed attempt to make an extra-strong glue.",
    ),
    (
        "Bubble Wrap",
        1957,
        "Bubble wrap was first pitched as textured wallpaper.",
    ),
    (
        "Scotch Tape",
        1930,
        "Richard Drew developed it for auto painters who needed clean masking edges.",
    ),
];
