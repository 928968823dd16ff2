// Core services for replicated objects

pub mod factory;
pub mod listener;
pub mod local;
pub mod member_event;
pub mod merge;
pub mod object;

// Re-export commonly used types
pub use factory::{
    ConcurrentListFactory, ConcurrentMapFactory, MapFactory, ObjectFactory, ObjectMap, SerdeFactory,
};
pub use listener::{LoggingObjectListener, ObjectListener, ObjectListeners};
pub use local::{LocalCluster, LocalMessageBus, PeerChannel};
pub use member_event::{LoggingMemberChangeListener, MemberChangeEventPublisher};
pub use merge::{MergeStrategy, UnionListMerge, UnionMapMerge};
pub use object::{ObjectConfig, ReplicatedObject};
