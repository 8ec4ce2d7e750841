//! TypeScript type generation module.
//!
//! Exports TypeScript definitions for the structs annotated with
//! `#[ts(export)]`. Runs as a test so the dashboard bindings are refreshed
//! whenever the suite runs.

#[cfg(test)]
mod tests {
    use std::{env, path::Path};

    use ts_rs::TS;

    #[test]
    fn generate_typescript_types() {
        // Output directory in order of preference:
        // 1. SENSORHUB_TS_OUTPUT_DIR
        // 2. ../../dashboard/src/types/generated (if the dashboard is checked out)
        // 3. ../ts-bindings
        let output_dir_str = if let Ok(env_dir) = env::var("SENSORHUB_TS_OUTPUT_DIR") {
            println!("Using TypeScript output directory from SENSORHUB_TS_OUTPUT_DIR: {}", env_dir);
            env_dir
        } else {
            let dashboard_dir = "../../dashboard/src/types/generated";
            let fallback_dir = "../ts-bindings";

            if Path::new(dashboard_dir).parent().unwrap_or(Path::new("")).exists() {
                println!("Using dashboard directory: {}", dashboard_dir);
                dashboard_dir.to_string()
            } else {
                println!("Using fallback directory: {}", fallback_dir);
                fallback_dir.to_string()
            }
        };

        let output_dir = Path::new(&output_dir_str);
        if !output_dir.exists() {
            std::fs::create_dir_all(output_dir).expect("Failed to create output directory");
        }

        // Remove stale bindings so renamed types do not linger.
        for entry in std::fs::read_dir(output_dir).expect("Failed to read output directory") {
            let path = entry.expect("Failed to read directory entry").path();
            if path.extension().and_then(|s| s.to_str()) == Some("ts") {
                std::fs::remove_file(&path).unwrap_or_else(|e| panic!("Failed to remove {:?}: {}", path, e));
            }
        }

        unsafe {
            env::set_var("TS_RS_EXPORT_DIR", output_dir);
        }

        use crate::{
            api::{
                ErrorResponse,
                company::UpdateCompanyRequest,
                folder::{CreateFolderRequest, UpdateFolderRequest},
                login::LoginSuccessResponse,
                power_sensor::{CreatePowerSensorRequest, UpdatePowerSensorRequest},
                power_toggle::{DeviceResponse, DeviceToggleRequest, PowerToggleRequest},
                product::UpdateProductRequest,
                provision::{ParseRequest, ParseResponse, ProvisionRequest, ProvisionResponse},
                purchase::{CheckoutRequest, CheckoutResponse},
                sensor::{CreateSensorRequest, UpdateSensorRequest},
                status::HealthStatus,
                user::{CreateUserRequest, UpdateUserRequest, UserRoleRequest},
            },
            csv_import::{ImportReport, ImportRowError},
            gateway::GatewayOutcome,
            map::{BoundingBox, MapData, MapMarker, MarkerKind},
            models::*,
            provisioning::{DeviceKind, PayloadFormat},
        };

        // Models
        Company::export().expect("Failed to export Company type");
        CompanyInput::export().expect("Failed to export CompanyInput type");
        User::export().expect("Failed to export User type");
        UserInput::export().expect("Failed to export UserInput type");
        UserStatus::export().expect("Failed to export UserStatus type");
        UserWithRoles::export().expect("Failed to export UserWithRoles type");
        Role::export().expect("Failed to export Role type");
        NewRole::export().expect("Failed to export NewRole type");
        Folder::export().expect("Failed to export Folder type");
        FolderInput::export().expect("Failed to export FolderInput type");
        Sensor::export().expect("Failed to export Sensor type");
        SensorInput::export().expect("Failed to export SensorInput type");
        SensorStatus::export().expect("Failed to export SensorStatus type");
        PowerSensor::export().expect("Failed to export PowerSensor type");
        PowerSensorInput::export().expect("Failed to export PowerSensorInput type");
        PowerSensorWithStatus::export().expect("Failed to export PowerSensorWithStatus type");
        PowerStatus::export().expect("Failed to export PowerStatus type");
        PowerAction::export().expect("Failed to export PowerAction type");
        PowerAuditEntry::export().expect("Failed to export PowerAuditEntry type");
        Product::export().expect("Failed to export Product type");
        ProductInput::export().expect("Failed to export ProductInput type");
        Purchase::export().expect("Failed to export Purchase type");
        PurchaseStatus::export().expect("Failed to export PurchaseStatus type");
        CartItem::export().expect("Failed to export CartItem type");

        // API request/response types
        ErrorResponse::export().expect("Failed to export ErrorResponse type");
        HealthStatus::export().expect("Failed to export HealthStatus type");
        LoginSuccessResponse::export().expect("Failed to export LoginSuccessResponse type");
        UpdateCompanyRequest::export().expect("Failed to export UpdateCompanyRequest type");
        CreateUserRequest::export().expect("Failed to export CreateUserRequest type");
        UpdateUserRequest::export().expect("Failed to export UpdateUserRequest type");
        UserRoleRequest::export().expect("Failed to export UserRoleRequest type");
        CreateFolderRequest::export().expect("Failed to export CreateFolderRequest type");
        UpdateFolderRequest::export().expect("Failed to export UpdateFolderRequest type");
        CreateSensorRequest::export().expect("Failed to export CreateSensorRequest type");
        UpdateSensorRequest::export().expect("Failed to export UpdateSensorRequest type");
        ImportReport::export().expect("Failed to export ImportReport type");
        ImportRowError::export().expect("Failed to export ImportRowError type");
        CreatePowerSensorRequest::export().expect("Failed to export CreatePowerSensorRequest type");
        UpdatePowerSensorRequest::export().expect("Failed to export UpdatePowerSensorRequest type");
        PowerToggleRequest::export().expect("Failed to export PowerToggleRequest type");
        DeviceToggleRequest::export().expect("Failed to export DeviceToggleRequest type");
        DeviceResponse::export().expect("Failed to export DeviceResponse type");
        GatewayOutcome::export().expect("Failed to export GatewayOutcome type");
        MapData::export().expect("Failed to export MapData type");
        MapMarker::export().expect("Failed to export MapMarker type");
        MarkerKind::export().expect("Failed to export MarkerKind type");
        BoundingBox::export().expect("Failed to export BoundingBox type");
        ParseRequest::export().expect("Failed to export ParseRequest type");
        ParseResponse::export().expect("Failed to export ParseResponse type");
        ProvisionRequest::export().expect("Failed to export ProvisionRequest type");
        ProvisionResponse::export().expect("Failed to export ProvisionResponse type");
        PayloadFormat::export().expect("Failed to export PayloadFormat type");
        DeviceKind::export().expect("Failed to export DeviceKind type");
        UpdateProductRequest::export().expect("Failed to export UpdateProductRequest type");
        CheckoutRequest::export().expect("Failed to export CheckoutRequest type");
        CheckoutResponse::export().expect("Failed to export CheckoutResponse type");

        println!("TypeScript types generated successfully in {:?}", output_dir);
    }
}
