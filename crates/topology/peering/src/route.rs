use isthmus_primitives::{Cidr, LinkId, RouteTableId, SubnetId};
use serde::{Deserialize, Serialize};

/// A route in one subnet's route table pointing at a peer range via a link.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Route {
    pub subnet_id: SubnetId,
    pub route_table_id: RouteTableId,
    pub destination_cidr: Cidr,
    pub via_link: LinkId,
}
