use hashbrown::hash_map::Entry;
use hashbrown::HashMap;
use tracing::debug;

use crate::descriptor::{MessageDescriptor, MessageType};
use crate::{DescriptorError, RawRecord};

/// Returns the descriptor of a record type, building it on first use.
pub fn descriptor_for<R: RawRecord>() -> &'static MessageDescriptor {
    R::static_descriptor()
}

/// A lookup table from full message names to record types, for callers that only learn which
/// type they hold at runtime.
#[derive(Clone, Debug, Default)]
pub struct Registry {
    types: HashMap<String, MessageType>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn message_type(&self, full_name: &str) -> Option<MessageType> {
        self.types.get(full_name).copied()
    }

    pub fn descriptor(&self, full_name: &str) -> Option<&'static MessageDescriptor> {
        self.message_type(full_name).map(|ty| ty.descriptor())
    }

    /// Creates an empty record of the named type.
    pub fn new_record(&self, full_name: &str) -> Option<Box<dyn RawRecord>> {
        self.message_type(full_name).map(|ty| ty.new_record())
    }

    pub fn contains(&self, full_name: &str) -> bool {
        self.types.contains_key(full_name)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Iterates the registered descriptors in no particular order.
    pub fn descriptors(&self) -> impl '_ + Iterator<Item = &'static MessageDescriptor> {
        self.types.values().map(|ty| ty.descriptor())
    }
}

/// Collects record types for a [`Registry`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    types: HashMap<String, MessageType>,
}

impl RegistryBuilder {
    /// Registers a record type along with every record type reachable through its fields.
    pub fn register<R: RawRecord + Default>(&mut self) -> Result<&mut Self, DescriptorError> {
        self.register_type(MessageType::of::<R>())
    }

    pub fn register_type(&mut self, ty: MessageType) -> Result<&mut Self, DescriptorError> {
        let mut pending = vec![ty];
        while let Some(ty) = pending.pop() {
            let descriptor = ty.descriptor();
            match self.types.entry(descriptor.full_name().to_owned()) {
                Entry::Occupied(existing) => {
                    // Boxed and unboxed forms of one record type share a descriptor.
                    if !std::ptr::eq(existing.get().descriptor(), descriptor) {
                        return Err(DescriptorError::ConflictingMessage {
                            message: descriptor.full_name().to_owned(),
                        });
                    }
                }
                Entry::Vacant(slot) => {
                    debug!(message = descriptor.full_name(), "registering record type");
                    slot.insert(ty);
                    pending.extend(
                        descriptor
                            .fields()
                            .iter()
                            .filter_map(|field| field.kind().message_type()),
                    );
                }
            }
        }
        Ok(self)
    }

    pub fn build(&mut self) -> Registry {
        Registry {
            types: std::mem::take(&mut self.types),
        }
    }
}
