//! Segment declarations and the registry that owns them.

use std::collections::BTreeMap;
use std::sync::Arc;

use isthmus_primitives::{Cidr, CidrError, Placement, RouteTableId, SegmentId, SubnetId, SubnetKind};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::RegistryError;

/// Availability zones a segment spreads each subnet group across by default.
pub const DEFAULT_MAX_AZS: usize = 2;

/// A named subnet group, replicated once per availability zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetGroup {
    pub name: String,
    #[serde(default)]
    pub kind: SubnetKind,
}

impl SubnetGroup {
    pub fn isolated() -> Self {
        Self {
            name: "isolated".to_owned(),
            kind: SubnetKind::Isolated,
        }
    }
}

/// Declarative segment input. The CIDR is validated on [`SegmentRegistry::declare`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentDecl {
    pub id: SegmentId,
    pub cidr: String,
    #[serde(flatten)]
    pub placement: Placement,
    /// Subnet groups; one isolated group when empty.
    #[serde(default, rename = "subnet_group")]
    pub subnet_groups: Vec<SubnetGroup>,
    #[serde(default)]
    pub max_azs: Option<usize>,
}

impl SegmentDecl {
    pub fn new(id: impl Into<SegmentId>, cidr: impl Into<String>, placement: Placement) -> Self {
        Self {
            id: id.into(),
            cidr: cidr.into(),
            placement,
            subnet_groups: Vec::new(),
            max_azs: None,
        }
    }

    pub fn with_subnet_group(mut self, name: impl Into<String>, kind: SubnetKind) -> Self {
        self.subnet_groups.push(SubnetGroup {
            name: name.into(),
            kind,
        });
        self
    }

    pub fn with_max_azs(mut self, max_azs: usize) -> Self {
        self.max_azs = Some(max_azs);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    pub id: SubnetId,
    pub segment_id: SegmentId,
    pub kind: SubnetKind,
    pub cidr: Cidr,
    pub route_table_id: RouteTableId,
}

/// An isolated virtual network bound to one placement. Immutable once declared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub id: SegmentId,
    pub cidr: Cidr,
    pub placement: Placement,
    pub subnets: Vec<Subnet>,
}

impl Segment {
    /// Subnets that receive routes towards a peer.
    pub fn routable_subnets(&self) -> impl Iterator<Item = &Subnet> {
        self.subnets.iter().filter(|s| s.kind.routes_via_peering())
    }

    pub fn subnets_of(&self, kind: SubnetKind) -> impl Iterator<Item = &Subnet> {
        self.subnets.iter().filter(move |s| s.kind == kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Reject any overlap between declared segments instead of warning.
    pub enforce_disjoint_cidrs: bool,
    pub default_max_azs: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            enforce_disjoint_cidrs: false,
            default_max_azs: DEFAULT_MAX_AZS,
        }
    }
}

/// Declared segments, keyed by id. No deletion: a redeploy is a new registry.
#[derive(Debug, Default)]
pub struct SegmentRegistry {
    config: RegistryConfig,
    segments: BTreeMap<SegmentId, Arc<Segment>>,
}

impl SegmentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            config,
            segments: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn declare(&mut self, decl: SegmentDecl) -> Result<Arc<Segment>, RegistryError> {
        if self.segments.contains_key(&decl.id) {
            return Err(RegistryError::DuplicateSegment(decl.id));
        }

        let cidr: Cidr = decl
            .cidr
            .parse()
            .map_err(|source| RegistryError::InvalidCidr {
                segment: decl.id.clone(),
                source,
            })?;

        for (other_id, other) in &self.segments {
            if !cidr.overlaps(&other.cidr) {
                continue;
            }
            if self.config.enforce_disjoint_cidrs {
                return Err(RegistryError::OverlappingCidr {
                    segment: decl.id,
                    cidr,
                    other: other_id.clone(),
                    other_cidr: other.cidr,
                });
            }
            warn!(
                segment = %decl.id,
                %cidr,
                other = %other_id,
                other_cidr = %other.cidr,
                "Segment CIDR overlaps an existing segment; tolerated unless the two are peered"
            );
        }

        let subnets = self.layout_subnets(&decl, cidr)?;
        let segment = Arc::new(Segment {
            id: decl.id.clone(),
            cidr,
            placement: decl.placement,
            subnets,
        });

        debug!(
            segment = %segment.id,
            cidr = %segment.cidr,
            placement = %segment.placement,
            subnets = segment.subnets.len(),
            "Declared segment"
        );
        self.segments.insert(decl.id, Arc::clone(&segment));
        Ok(segment)
    }

    /// Carve one subnet per (group, availability zone) out of the segment range.
    fn layout_subnets(&self, decl: &SegmentDecl, cidr: Cidr) -> Result<Vec<Subnet>, RegistryError> {
        let groups = if decl.subnet_groups.is_empty() {
            vec![SubnetGroup::isolated()]
        } else {
            decl.subnet_groups.clone()
        };
        let azs = decl.max_azs.unwrap_or(self.config.default_max_azs).max(1);

        let invalid = |source| RegistryError::InvalidCidr {
            segment: decl.id.clone(),
            source,
        };
        let count = groups.len().checked_mul(azs).ok_or_else(|| {
            invalid(CidrError::CannotCarve {
                net: cidr.net(),
                count: usize::MAX,
            })
        })?;
        let ranges = cidr.carve(count).map_err(invalid)?;

        let slots = groups
            .iter()
            .flat_map(|group| (0..azs).map(move |az| (group, az)));
        let subnets = slots
            .zip(ranges)
            .map(|((group, az), range)| {
                let id = SubnetId::new(format!("{}/{}-{az}", decl.id, group.name));
                Subnet {
                    route_table_id: RouteTableId::new(format!("{id}/rtb")),
                    id,
                    segment_id: decl.id.clone(),
                    kind: group.kind,
                    cidr: range,
                }
            })
            .collect();
        Ok(subnets)
    }

    pub fn resolve(&self, id: &SegmentId) -> Result<Arc<Segment>, RegistryError> {
        self.segments
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownSegment(id.clone()))
    }

    pub fn contains(&self, id: &SegmentId) -> bool {
        self.segments.contains_key(id)
    }

    /// Declared segments whose CIDR overlaps the given segment's.
    pub fn overlapping(&self, id: &SegmentId) -> Result<Vec<SegmentId>, RegistryError> {
        let segment = self.resolve(id)?;
        Ok(self
            .segments
            .values()
            .filter(|other| other.id != segment.id && other.cidr.overlaps(&segment.cidr))
            .map(|other| other.id.clone())
            .collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Segment>> {
        self.segments.values()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}
