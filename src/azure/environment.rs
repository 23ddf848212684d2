//! Azure clouds and their Resource Manager endpoints

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AzureEnvironment {
    #[default]
    AzureCloud,
    AzureChinaCloud,
    AzureUSGovernment,
}

impl AzureEnvironment {
    /// Resource Manager endpoint, without trailing slash
    pub fn management_endpoint(&self) -> &'static str {
        match self {
            AzureEnvironment::AzureCloud => "https://management.azure.com",
            AzureEnvironment::AzureChinaCloud => "https://management.chinacloudapi.cn",
            AzureEnvironment::AzureUSGovernment => "https://management.usgovcloudapi.net",
        }
    }

    /// Token audience for Resource Manager
    pub fn management_scope(&self) -> String {
        format!("{}/", self.management_endpoint())
    }

    /// Parse the `environmentName` written by the Azure CLI
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "azurecloud" => Some(AzureEnvironment::AzureCloud),
            "azurechinacloud" => Some(AzureEnvironment::AzureChinaCloud),
            "azureusgovernment" => Some(AzureEnvironment::AzureUSGovernment),
            _ => None,
        }
    }
}

impl fmt::Display for AzureEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AzureEnvironment::AzureCloud => "AzureCloud",
            AzureEnvironment::AzureChinaCloud => "AzureChinaCloud",
            AzureEnvironment::AzureUSGovernment => "AzureUSGovernment",
        };
        f.write_str(name)
    }
}
