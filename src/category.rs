use serde::{Deserialize, Serialize};

/// Interaction category of a body. Rays filter on these.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Static,
    Moving,
    SwitchPlate,
    Stackable,
    Actor,
    Exit,
    Key,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Static,
        Category::Moving,
        Category::SwitchPlate,
        Category::Stackable,
        Category::Actor,
        Category::Exit,
        Category::Key,
    ];

    const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct CategoryMask(u8);

impl CategoryMask {
    pub const NONE: CategoryMask = CategoryMask(0);

    /// Everything a character or block cannot pass through.
    pub const STRUCTURES: CategoryMask = CategoryMask(
        Category::Static.bit() | Category::Moving.bit() | Category::SwitchPlate.bit(),
    );

    /// What a moving structure may carry along.
    pub const PASSENGERS: CategoryMask =
        CategoryMask(Category::Actor.bit() | Category::Stackable.bit());

    pub const STACKABLES: CategoryMask = CategoryMask(Category::Stackable.bit());

    pub const fn of(category: Category) -> Self {
        CategoryMask(category.bit())
    }

    pub const fn with(self, category: Category) -> Self {
        CategoryMask(self.0 | category.bit())
    }

    pub const fn union(self, other: CategoryMask) -> Self {
        CategoryMask(self.0 | other.0)
    }

    pub const fn contains(self, category: Category) -> bool {
        self.0 & category.bit() != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Category> {
        Category::ALL.into_iter().filter(move |c| self.contains(*c))
    }
}

impl FromIterator<Category> for CategoryMask {
    fn from_iter<T: IntoIterator<Item = Category>>(iter: T) -> Self {
        iter.into_iter().fold(CategoryMask::NONE, CategoryMask::with)
    }
}

impl Serialize for CategoryMask {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for CategoryMask {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let categories = Vec::<Category>::deserialize(deserializer)?;
        Ok(categories.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structures_mask_excludes_passengers() {
        assert!(CategoryMask::STRUCTURES.contains(Category::Moving));
        assert!(CategoryMask::STRUCTURES.contains(Category::SwitchPlate));
        assert!(!CategoryMask::STRUCTURES.contains(Category::Actor));
        assert!(!CategoryMask::STRUCTURES.contains(Category::Stackable));
    }

    #[test]
    fn mask_deserializes_from_category_names() {
        let mask: CategoryMask = serde_json::from_str(r#"["static", "stackable"]"#).unwrap();
        assert_eq!(
            mask,
            CategoryMask::of(Category::Static).with(Category::Stackable)
        );
        let json = serde_json::to_string(&mask).unwrap();
        assert_eq!(json, r#"["static","stackable"]"#);
    }
}
