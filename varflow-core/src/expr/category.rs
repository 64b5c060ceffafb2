//! Node categories and their subtype relation.

use serde::{Deserialize, Serialize};

/// What kind of quantity a node represents.
///
/// Categories form a small hierarchy. Combining two nodes yields the more
/// specific of the two categories when one is a subtype of the other;
/// `Constant` is dimension-agnostic and defers to its peer.
///
/// ```text
/// Generic
/// ├── CellField
/// │   └── ModularCellField
/// └── FaceField
/// Constant (outside the hierarchy)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Scalar-like value wrapped from a raw operand.
    Constant,
    /// Any variable not tied to a mesh location.
    #[default]
    Generic,
    /// Values defined on cell centers.
    CellField,
    /// Values defined on faces.
    FaceField,
    /// Cell values wrapped onto a periodic interval.
    ModularCellField,
}

impl Category {
    /// The immediate supertype, if any.
    pub fn parent(self) -> Option<Category> {
        match self {
            Category::Constant | Category::Generic => None,
            Category::CellField | Category::FaceField => Some(Category::Generic),
            Category::ModularCellField => Some(Category::CellField),
        }
    }

    /// Whether `self` is `other` or derives from it.
    pub fn is_subtype_of(self, other: Category) -> bool {
        let mut current = Some(self);
        while let Some(category) = current {
            if category == other {
                return true;
            }
            current = category.parent();
        }
        false
    }
}
