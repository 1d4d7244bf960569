use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{AccountId, Region};

/// The account/region boundary a resource is provisioned in.
///
/// Values produced in one placement and consumed in another must travel
/// through a reference token rather than a direct dependency.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Placement {
    pub account: AccountId,
    pub region: Region,
}

impl Placement {
    pub fn new(account: impl Into<AccountId>, region: impl Into<Region>) -> Self {
        Self {
            account: account.into(),
            region: region.into(),
        }
    }

    pub fn same_account(&self, other: &Placement) -> bool {
        self.account == other.account
    }

    pub fn same_region(&self, other: &Placement) -> bool {
        self.region == other.region
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.account, self.region)
    }
}
