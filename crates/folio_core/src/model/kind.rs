//! Entity kind descriptors.
//!
//! A kind names one backing table and the storage-level rules that apply to
//! it. Business rules stay with the consumers.

/// Belongs-to relation: `local_field` holds the id of a `target` entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relation {
    pub name: &'static str,
    pub local_field: &'static str,
    pub target: &'static EntityKind,
}

/// Static description of one entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityKind {
    /// Kind identifier; also the table name and the cache namespace segment.
    pub name: &'static str,
    /// Whether deletes can be soft (trash/restore).
    pub soft_deletes: bool,
    /// Fields that must be present and non-null on create.
    pub required: &'static [&'static str],
    /// Fields whose values must be unique across the table.
    pub unique: &'static [&'static str],
    pub relations: &'static [Relation],
}

impl EntityKind {
    pub const PAGES: EntityKind = EntityKind {
        name: "pages",
        soft_deletes: true,
        required: &["name"],
        unique: &[],
        relations: &[],
    };

    pub const CATEGORIES: EntityKind = EntityKind {
        name: "categories",
        soft_deletes: true,
        required: &["name"],
        unique: &[],
        relations: &[],
    };

    pub const POSTS: EntityKind = EntityKind {
        name: "posts",
        soft_deletes: true,
        required: &["name"],
        unique: &[],
        relations: &[Relation {
            name: "category",
            local_field: "category_id",
            target: &EntityKind::CATEGORIES,
        }],
    };

    pub const SETTINGS: EntityKind = EntityKind {
        name: "settings",
        soft_deletes: false,
        required: &["key"],
        unique: &["key"],
        relations: &[],
    };

    pub const LANGUAGES: EntityKind = EntityKind {
        name: "languages",
        soft_deletes: false,
        required: &["lang_code"],
        unique: &["lang_code"],
        relations: &[],
    };

    pub const NOTES: EntityKind = EntityKind {
        name: "notes",
        soft_deletes: false,
        required: &["note"],
        unique: &[],
        relations: &[],
    };

    pub const WIDGETS: EntityKind = EntityKind {
        name: "widgets",
        soft_deletes: false,
        required: &["widget_id", "sidebar_id"],
        unique: &[],
        relations: &[],
    };

    /// Kinds whose tables are created by the bundled migrations.
    pub const BUILTIN: &'static [EntityKind] = &[
        EntityKind::PAGES,
        EntityKind::CATEGORIES,
        EntityKind::POSTS,
        EntityKind::SETTINGS,
        EntityKind::LANGUAGES,
        EntityKind::NOTES,
        EntityKind::WIDGETS,
    ];

    /// Looks up a built-in kind by name.
    pub fn builtin(name: &str) -> Option<EntityKind> {
        Self::BUILTIN.iter().copied().find(|kind| kind.name == name)
    }

    pub fn table(&self) -> &'static str {
        self.name
    }

    pub fn relation(&self, name: &str) -> Option<&'static Relation> {
        self.relations.iter().find(|relation| relation.name == name)
    }

    /// Returns whether reads of `self` may embed rows of `other`.
    pub fn embeds(&self, other: &EntityKind) -> bool {
        self.relations
            .iter()
            .any(|relation| relation.target.name == other.name)
    }

    /// Kinds among `kinds` whose relation reads embed rows of `self`.
    pub fn dependents<'a>(&self, kinds: &'a [EntityKind]) -> Vec<&'a EntityKind> {
        kinds
            .iter()
            .filter(|kind| kind.name != self.name && kind.embeds(self))
            .collect()
    }
}
