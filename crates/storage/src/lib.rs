pub mod conformance;
mod error;
mod memory;
mod record;
mod traits;

pub use error::StorageError;
pub use memory::{MemoryStore, StoreSnapshot};
pub use record::{
    CaseFilter, CasePatch, CaseRecord, ClaimOrigin, CommunicationChannel, CommunicationRecord,
    EventFilter, ParseEnumError, Priority, SchemaCapabilities, SerialRecord, SerialUpsert,
    ServiceEventRecord, ServiceEventType, Stage, WarrantyBasis, WarrantyStatus,
};
pub use traits::ReturnStore;
