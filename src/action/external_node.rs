//! Catalog actions for nodes that are not running an agent.
use super::{require, Action, Context, Outcome, ValidationError};
use crate::cluster::{
    null_as_default, AgentService, CatalogDeregistration, CatalogRegistration, ClusterError,
};
use crate::registry::{Factories, FactoryError};
use serde::{Deserialize, Serialize};
use std::fmt;

pub fn register(factories: &mut Factories) {
    factories.register(factory);
}

fn factory(id: &str) -> Result<Box<dyn Action>, FactoryError> {
    match id {
        "ExternalNodeRegister" => Ok(Box::<ExternalNodeRegister>::default()),
        "ExternalNodeDeregister" => Ok(Box::<ExternalNodeDeregister>::default()),
        _ => Err(FactoryError::unknown(id)),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ExternalNodeService {
    #[serde(rename = "ID", deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub service: String,
    #[serde(deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub port: u16,
}

impl From<AgentService> for ExternalNodeService {
    fn from(service: AgentService) -> Self {
        Self {
            id: service.id,
            service: service.service,
            tags: service.tags,
            port: service.port,
        }
    }
}

impl From<&ExternalNodeService> for AgentService {
    fn from(service: &ExternalNodeService) -> Self {
        Self {
            id: service.id.clone(),
            service: service.service.clone(),
            tags: service.tags.clone(),
            port: service.port,
        }
    }
}

/// Register `node` at `address`, then each service under it in order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ExternalNodeRegister {
    #[serde(deserialize_with = "null_as_default")]
    pub node: String,
    #[serde(deserialize_with = "null_as_default")]
    pub address: String,
    #[serde(deserialize_with = "null_as_default")]
    pub services: Vec<ExternalNodeService>,
}

/// Remove the listed service ids from `node`, or the whole node when the
/// list is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ExternalNodeDeregister {
    #[serde(deserialize_with = "null_as_default")]
    pub node: String,
    #[serde(deserialize_with = "null_as_default")]
    pub services: Vec<String>,
}

impl Action for ExternalNodeRegister {
    fn kind(&self) -> &'static str {
        "ExternalNodeRegister"
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require(&self.node, "Node")?;
        require(&self.address, "Address")?;
        for (index, service) in self.services.iter().enumerate() {
            require(&service.service, &format!("Services[{index}].Service"))?;
        }
        Ok(())
    }

    fn apply(&self, ctx: &mut Context<'_>) -> Result<Outcome, ClusterError> {
        ctx.cluster.catalog_register(&CatalogRegistration {
            node: self.node.clone(),
            address: self.address.clone(),
            service: None,
        })?;
        for service in &self.services {
            ctx.cluster.catalog_register(&CatalogRegistration {
                node: self.node.clone(),
                address: self.address.clone(),
                service: Some(service.into()),
            })?;
        }
        Ok(Outcome::Applied)
    }
}

impl fmt::Display for ExternalNodeRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "External Node Register {:?} {:?}", self.node, self.address)?;
        if self.services.is_empty() {
            return Ok(());
        }
        let services: Vec<String> = self
            .services
            .iter()
            .map(|s| {
                format!(
                    "{:?} {:?} {:?} {}",
                    s.service,
                    s.id,
                    s.tags.join(", "),
                    s.port
                )
            })
            .collect();
        write!(f, " services, {}", services.join(", "))
    }
}

impl Action for ExternalNodeDeregister {
    fn kind(&self) -> &'static str {
        "ExternalNodeDeregister"
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require(&self.node, "Node")?;
        for (index, service_id) in self.services.iter().enumerate() {
            require(service_id, &format!("Services[{index}]"))?;
        }
        Ok(())
    }

    fn apply(&self, ctx: &mut Context<'_>) -> Result<Outcome, ClusterError> {
        if self.services.is_empty() {
            ctx.cluster.catalog_deregister(&CatalogDeregistration {
                node: self.node.clone(),
                service_id: None,
            })?;
            return Ok(Outcome::Applied);
        }
        for service_id in &self.services {
            ctx.cluster.catalog_deregister(&CatalogDeregistration {
                node: self.node.clone(),
                service_id: Some(service_id.clone()),
            })?;
        }
        Ok(Outcome::Applied)
    }
}

impl fmt::Display for ExternalNodeDeregister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.services.is_empty() {
            return write!(f, "External Node Deregister {:?}", self.node);
        }
        write!(
            f,
            "External Node Deregister {:?} services {:?}",
            self.node,
            self.services.join(", ")
        )
    }
}
