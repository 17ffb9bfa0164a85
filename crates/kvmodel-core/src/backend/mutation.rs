use crate::{
    key::{IndexFragment, Key, KeyError, KeyShape},
    store::Command,
};

///
/// Member
///
/// One element written into or removed from a collection key.
///
/// Value   → set / list member, sorted-set member with score 0, hash field
/// Scored  → sorted-set member with an explicit score
/// Field   → hash field and its value
///

#[derive(Clone, Debug, PartialEq)]
pub enum Member {
    Value(String),
    Scored { member: String, score: f64 },
    Field { field: String, value: String },
}

impl Member {
    #[must_use]
    pub fn scored(member: impl Into<String>, score: f64) -> Self {
        Self::Scored {
            member: member.into(),
            score,
        }
    }

    #[must_use]
    pub fn field(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Field {
            field: field.into(),
            value: value.into(),
        }
    }

    const fn label(&self) -> &'static str {
        match self {
            Self::Value(_) => "plain",
            Self::Scored { .. } => "scored",
            Self::Field { .. } => "field",
        }
    }

    // Member text used for removal: the value, the sorted-set member or the
    // hash field.
    fn into_name(self) -> String {
        match self {
            Self::Value(name) | Self::Scored { member: name, .. } | Self::Field { field: name, .. } => {
                name
            }
        }
    }
}

impl From<&str> for Member {
    fn from(value: &str) -> Self {
        Self::Value(value.to_string())
    }
}

impl From<String> for Member {
    fn from(value: String) -> Self {
        Self::Value(value)
    }
}

impl From<&String> for Member {
    fn from(value: &String) -> Self {
        Self::Value(value.clone())
    }
}

///
/// Mutation
///
/// Ordered batch of writes, applied atomically by `Backend::apply`.
/// Every builder method checks the key's declared shape first.
///

#[derive(Clone, Debug, Default)]
pub struct Mutation {
    commands: Vec<Command>,
}

impl Mutation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    #[must_use]
    pub fn into_commands(self) -> Vec<Command> {
        self.commands
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.commands.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    // ------------------------------------------------------------------
    // Builders
    // ------------------------------------------------------------------

    /// Overwrite a scalar key.
    pub fn set(&mut self, key: &Key, value: impl Into<String>) -> Result<&mut Self, KeyError> {
        key.expect_shape("set", &[KeyShape::Scalar])?;
        self.commands.push(Command::Set {
            key: key.name().to_string(),
            value: value.into(),
        });

        Ok(self)
    }

    /// Add a member to a collection key.
    pub fn add(&mut self, key: &Key, member: impl Into<Member>) -> Result<&mut Self, KeyError> {
        let member = member.into();
        let name = key.name().to_string();

        let command = match (key.shape(), member) {
            (KeyShape::Set, Member::Value(member)) => Command::SAdd { key: name, member },
            (KeyShape::List, Member::Value(value)) => Command::RPush { key: name, value },
            (KeyShape::SortedSet, Member::Value(member)) => Command::ZAdd {
                key: name,
                member,
                score: 0.0,
            },
            (KeyShape::SortedSet, Member::Scored { member, score }) => Command::ZAdd {
                key: name,
                member,
                score,
            },
            (KeyShape::Hash, Member::Field { field, value }) => Command::HSet {
                key: name,
                field,
                value,
            },
            (KeyShape::Scalar, _) => {
                return Err(KeyError::ShapeMismatch {
                    key: name,
                    shape: KeyShape::Scalar,
                    operation: "add",
                });
            }
            (shape, member) => {
                return Err(KeyError::InvalidMember {
                    key: name,
                    shape,
                    member: member.label(),
                });
            }
        };
        self.commands.push(command);

        Ok(self)
    }

    /// Remove a member from a set, sorted set or hash.
    pub fn delete(&mut self, key: &Key, member: impl Into<Member>) -> Result<&mut Self, KeyError> {
        key.expect_shape("delete", &[KeyShape::Set, KeyShape::SortedSet, KeyShape::Hash])?;
        let name = key.name().to_string();
        let member = member.into().into_name();

        let command = match key.shape() {
            KeyShape::Set => Command::SRem { key: name, member },
            KeyShape::SortedSet => Command::ZRem { key: name, member },
            _ => Command::HDel {
                key: name,
                field: member,
            },
        };
        self.commands.push(command);

        Ok(self)
    }

    /// Move a member from one set to another.
    pub fn move_member(
        &mut self,
        source: &Key,
        destination: &Key,
        member: impl Into<String>,
    ) -> Result<&mut Self, KeyError> {
        source.expect_shape("move", &[KeyShape::Set])?;
        destination.expect_shape("move", &[KeyShape::Set])?;
        self.commands.push(Command::SMove {
            source: source.name().to_string(),
            destination: destination.name().to_string(),
            member: member.into(),
        });

        Ok(self)
    }

    /// Empty a collection key.
    pub fn clear(&mut self, key: &Key) -> Result<&mut Self, KeyError> {
        key.expect_shape(
            "clear",
            &[
                KeyShape::List,
                KeyShape::Set,
                KeyShape::Hash,
                KeyShape::SortedSet,
            ],
        )?;
        self.commands.push(Command::Del {
            key: key.name().to_string(),
        });

        Ok(self)
    }

    /// Delete a key of any shape.
    pub fn purge(&mut self, key: &Key) -> &mut Self {
        self.commands.push(Command::Del {
            key: key.name().to_string(),
        });

        self
    }

    /// Delete a value-index entry together with its parent reference.
    pub fn purge_entry(
        &mut self,
        parent: &Key,
        entry: &Key,
        fragment: &IndexFragment,
    ) -> Result<&mut Self, KeyError> {
        parent.expect_shape("purge", &[KeyShape::Set])?;

        Ok(self.purge_indexed(parent, entry, &fragment.to_string()))
    }

    pub(crate) fn purge_indexed(&mut self, parent: &Key, entry: &Key, fragment: &str) -> &mut Self {
        self.purge(entry);
        self.commands.push(Command::SRem {
            key: parent.name().to_string(),
            member: fragment.to_string(),
        });

        self
    }
}
