//! Validated network ranges.

use std::fmt;
use std::str::FromStr;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

/// Errors from CIDR parsing and carving.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CidrError {
    #[error("malformed CIDR {0:?}")]
    Malformed(String),
    #[error("CIDR {input} has host bits set (network is {canonical})")]
    NotCanonical { input: String, canonical: IpNet },
    #[error("CIDR {0} covers a single address")]
    Degenerate(IpNet),
    #[error("cannot carve {count} subnets out of {net}")]
    CannotCarve { net: IpNet, count: usize },
}

/// A canonical network range with room for at least two addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cidr(IpNet);

impl Cidr {
    pub fn new(net: IpNet) -> Result<Self, CidrError> {
        if net.trunc() != net {
            return Err(CidrError::NotCanonical {
                input: net.to_string(),
                canonical: net.trunc(),
            });
        }
        if net.prefix_len() >= net.max_prefix_len() {
            return Err(CidrError::Degenerate(net));
        }
        Ok(Self(net))
    }

    pub fn net(&self) -> IpNet {
        self.0
    }

    pub fn prefix_len(&self) -> u8 {
        self.0.prefix_len()
    }

    /// True if the two ranges share any address.
    pub fn overlaps(&self, other: &Cidr) -> bool {
        self.0.contains(&other.0.network()) || other.0.contains(&self.0.network())
    }

    /// True if `other` lies entirely inside this range.
    pub fn contains(&self, other: &Cidr) -> bool {
        self.0.contains(&other.0)
    }

    /// Split into `count` equally sized, non-overlapping ranges.
    ///
    /// The prefix grows by `ceil(log2(count))` bits; the first `count` ranges
    /// of that size are returned in address order.
    pub fn carve(&self, count: usize) -> Result<Vec<Cidr>, CidrError> {
        let cannot = || CidrError::CannotCarve {
            net: self.0,
            count,
        };
        if count == 0 {
            return Err(cannot());
        }

        let extra_bits = usize::BITS - (count - 1).leading_zeros();
        let new_prefix = u32::from(self.0.prefix_len()) + extra_bits;
        let new_prefix = u8::try_from(new_prefix).map_err(|_| cannot())?;
        if new_prefix >= self.0.max_prefix_len() {
            return Err(cannot());
        }

        let subnets = self.0.subnets(new_prefix).map_err(|_| cannot())?;
        subnets.take(count).map(Cidr::new).collect()
    }
}

impl FromStr for Cidr {
    type Err = CidrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let net = IpNet::from_str(s.trim()).map_err(|_| CidrError::Malformed(s.to_owned()))?;
        if net.trunc() != net {
            return Err(CidrError::NotCanonical {
                input: s.to_owned(),
                canonical: net.trunc(),
            });
        }
        Self::new(net)
    }
}

impl TryFrom<String> for Cidr {
    type Error = CidrError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Cidr> for String {
    fn from(cidr: Cidr) -> Self {
        cidr.to_string()
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
