// SPDX-License-Identifier: MPL-2.0

pub mod common;

pub mod auth;
pub mod connack;
pub mod connect;
pub mod disconnect;
pub mod pingreq;
pub mod pingresp;
pub mod puback;
pub mod pubcomp;
pub mod publish;
pub mod pubrec;
pub mod pubrel;
pub mod suback;
pub mod subscribe;
pub mod unsuback;
pub mod unsubscribe;
pub mod will;

mod ack;

pub use common::properties::{Properties, Property, PropertyLookup};
pub use common::reason_code;

//re-export mod with suffix v5 for easier access
pub use auth as authv5;
pub use connack as connackv5;
pub use connect as connectv5;
pub use disconnect as disconnectv5;
pub use pingreq as pingreqv5;
pub use pingresp as pingrespv5;
pub use puback as pubackv5;
pub use pubcomp as pubcompv5;
pub use publish as publishv5;
pub use pubrec as pubrecv5;
pub use pubrel as pubrelv5;
pub use suback as subackv5;
pub use subscribe as subscribev5;
pub use unsuback as unsubackv5;
pub use unsubscribe as unsubscribev5;
pub use will as willv5;
