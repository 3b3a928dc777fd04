//! The record shape visible to the engine.

/// A user record stored by the engine.
///
/// The engine assigns IDs: `set_id` is called after allocation (on
/// insert) and after decoding (on reads), so user code never invents
/// entry IDs. The `Default` impl is the record factory used for
/// validation at store creation.
///
/// `relationships()` must return one slot per relationship name declared
/// when the store was opened, in declaration order. A slot may hold zero
/// or more relationship IDs (e.g. a tags slot).
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Clone, Default, Serialize, Deserialize)]
/// struct Contact {
///     #[serde(default)]
///     id: String,
///     user_id: String,
///     group_id: String,
///     tags: Vec<String>,
/// }
///
/// impl Entry for Contact {
///     fn id(&self) -> &str {
///         &self.id
///     }
///
///     fn set_id(&mut self, id: String) {
///         self.id = id;
///     }
///
///     fn relationships(&self) -> Relationships {
///         let mut r = Relationships::new();
///         r.append(&self.user_id);
///         r.append(&self.group_id);
///         r.append_all(&self.tags);
///         r
///     }
/// }
/// ```
pub trait Entry: Default + Send + 'static {
    /// Returns the entry's ID (empty until assigned).
    fn id(&self) -> &str;

    /// Sets the entry's ID.
    fn set_id(&mut self, id: String);

    /// Returns the entry's relationship slots, one per declared
    /// relationship name.
    fn relationships(&self) -> Relationships;
}

/// An ordered list of relationship slots.
///
/// Each `append`/`append_all` call produces one slot, matching one
/// declared relationship name by position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Relationships {
    slots: Vec<Vec<String>>,
}

impl Relationships {
    /// Creates an empty relationship list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a slot holding a single relationship ID.
    pub fn append(&mut self, id: impl Into<String>) {
        self.slots.push(vec![id.into()]);
    }

    /// Appends a slot holding every ID in `ids`.
    pub fn append_all<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.slots.push(ids.into_iter().map(Into::into).collect());
    }

    /// Returns the number of slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if no slots were appended.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Returns the IDs in slot `index`.
    #[must_use]
    pub fn slot(&self, index: usize) -> &[String] {
        self.slots.get(index).map_or(&[], Vec::as_slice)
    }
}
