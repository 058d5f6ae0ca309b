use datastore::path::encode_key_value;

/// ObjectType is the filter a subscriber applies: the kind of topology
/// element it wants change notifications for.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
pub enum ObjectType {
    #[serde(rename = "NODE")]
    Node,
    #[serde(rename = "LINK")]
    Link,
    #[serde(rename = "TP")]
    TerminationPoint,
    #[serde(rename = "TTP")]
    TunnelTerminationPoint,
    #[serde(rename = "TUNNEL")]
    Tunnel,
    #[serde(rename = "client-service")]
    ClientService,
    #[serde(rename = "eth-tran-service")]
    EthTranService,
    #[serde(rename = "service-pm")]
    ServicePm,
}

impl ObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Node => "NODE",
            ObjectType::Link => "LINK",
            ObjectType::TerminationPoint => "TP",
            ObjectType::TunnelTerminationPoint => "TTP",
            ObjectType::Tunnel => "TUNNEL",
            ObjectType::ClientService => "client-service",
            ObjectType::EthTranService => "eth-tran-service",
            ObjectType::ServicePm => "service-pm",
        }
    }

    /// The RESTCONF URL a change notification for this object type targets,
    /// given the positional id tuple of the changed element. None when the
    /// object type has no target pattern or the tuple has the wrong arity.
    pub fn target_url(&self, ids: &[String]) -> Option<String> {
        let e = |index: usize| encode_key_value(&ids[index]);
        match (self, ids.len()) {
            (ObjectType::Node, 2) => Some(format!(
                "/restconf/data/ietf-network:networks/network={}/node={}",
                e(0),
                e(1),
            )),
            (ObjectType::TerminationPoint, 3) => Some(format!(
                "/restconf/data/ietf-network:networks/network={}/node={}\
                 /ietf-network-topology:termination-point={}",
                e(0),
                e(1),
                e(2),
            )),
            (ObjectType::TunnelTerminationPoint, 3) => Some(format!(
                "/restconf/data/ietf-network:networks/network={}/node={}\
                 /ietf-te-topology:te/tunnel-termination-point={}",
                e(0),
                e(1),
                e(2),
            )),
            (ObjectType::Link, 2) => Some(format!(
                "/restconf/data/ietf-network:networks/network={}\
                 /ietf-network-topology:link={}",
                e(0),
                e(1),
            )),
            _ => None,
        }
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ObjectType {
    type Err = UnknownObjectType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "NODE" => ObjectType::Node,
            "LINK" => ObjectType::Link,
            "TP" => ObjectType::TerminationPoint,
            "TTP" => ObjectType::TunnelTerminationPoint,
            "TUNNEL" => ObjectType::Tunnel,
            "client-service" => ObjectType::ClientService,
            "eth-tran-service" => ObjectType::EthTranService,
            "service-pm" => ObjectType::ServicePm,
            _ => return Err(UnknownObjectType(s.to_string())),
        })
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown object type {0:?}")]
pub struct UnknownObjectType(pub String);
