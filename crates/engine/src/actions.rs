//! Catalog of worker actions and typed request builders.
//!
//! The bridge itself accepts any action name; these builders pin down the
//! argument names the worker expects.

use crate::types::{OperationRequest, Service};

pub const DOCKER_ACTIONS: &[&str] = &[
    "list_images",
    "list_containers",
    "list_running_containers",
    "create_dockerfile",
    "build_image",
    "stop_container",
    "start_container",
    "create_container",
    "delete_container",
    "delete_image",
    "get_container_logs",
    "get_container_stats",
    "search_dockerhub",
    "pull_image",
    "search_image_local",
];

pub const QEMU_ACTIONS: &[&str] = &[
    "start_virtual_machine",
    "create_vm_from_config",
    "delete_vm",
    "list_running_vms",
    "stop_vm",
    "create_disk_image",
];

/// Actions that remove or terminate something.
pub const DESTRUCTIVE_ACTIONS: &[&str] = &["delete_container", "delete_image", "delete_vm", "stop_vm"];

pub fn known_actions(service: Service) -> &'static [&'static str] {
    match service {
        Service::Docker => DOCKER_ACTIONS,
        Service::Qemu => QEMU_ACTIONS,
    }
}

pub fn is_known(service: Service, action: &str) -> bool {
    known_actions(service).contains(&action)
}

pub fn is_destructive(action: &str) -> bool {
    DESTRUCTIVE_ACTIONS.contains(&action)
}

/// Default line count for `get_container_logs`.
pub const DEFAULT_LOG_TAIL: u32 = 100;

pub mod docker {
    use super::*;

    fn req(action: &str) -> OperationRequest {
        OperationRequest::new(Service::Docker, action)
    }

    pub fn list_images() -> OperationRequest {
        req("list_images")
    }

    pub fn list_containers() -> OperationRequest {
        req("list_containers")
    }

    pub fn list_running_containers() -> OperationRequest {
        req("list_running_containers")
    }

    /// `path` may be a directory (a `Dockerfile` is created inside) or a file.
    pub fn create_dockerfile(path: &str, code: &str) -> OperationRequest {
        req("create_dockerfile").arg("path", path).arg("code", code)
    }

    pub fn build_image(path: &str, tag: &str) -> OperationRequest {
        req("build_image").arg("path", path).arg("tag", tag)
    }

    pub fn stop_container(id: &str) -> OperationRequest {
        req("stop_container").arg("id", id)
    }

    pub fn start_container(id: &str) -> OperationRequest {
        req("start_container").arg("id", id)
    }

    pub fn create_container(
        image: &str,
        name: Option<&str>,
        ports: &[String],
        env_vars: &[String],
    ) -> OperationRequest {
        req("create_container")
            .arg("image", image)
            .arg("name", name)
            .arg("ports", ports)
            .arg("env_vars", env_vars)
    }

    pub fn delete_container(id: &str, force: bool) -> OperationRequest {
        req("delete_container").arg("id", id).arg("force", force)
    }

    pub fn delete_image(id: &str, force: bool) -> OperationRequest {
        req("delete_image").arg("id", id).arg("force", force)
    }

    pub fn get_container_logs(id: &str, tail: Option<u32>) -> OperationRequest {
        req("get_container_logs")
            .arg("id", id)
            .arg("tail", tail.unwrap_or(DEFAULT_LOG_TAIL))
    }

    pub fn get_container_stats(id: &str) -> OperationRequest {
        req("get_container_stats").arg("id", id)
    }

    pub fn search_dockerhub(name: &str) -> OperationRequest {
        req("search_dockerhub").arg("name", name)
    }

    pub fn pull_image(name: &str) -> OperationRequest {
        req("pull_image").arg("name", name)
    }

    pub fn search_image_local(name: &str) -> OperationRequest {
        req("search_image_local").arg("name", name)
    }
}

pub mod qemu {
    use super::*;

    fn req(action: &str) -> OperationRequest {
        OperationRequest::new(Service::Qemu, action)
    }

    /// `ram_size` is in MB. `disk_path` may be a directory holding a disk image.
    pub fn start_virtual_machine(
        cpu_cores: u32,
        ram_size: u32,
        disk_path: &str,
        iso_path: Option<&str>,
    ) -> OperationRequest {
        req("start_virtual_machine")
            .arg("cpu_cores", cpu_cores)
            .arg("ram_size", ram_size)
            .arg("disk_path", disk_path)
            .arg("iso_path", iso_path)
    }

    pub fn create_vm_from_config(config_file_path: &str) -> OperationRequest {
        req("create_vm_from_config").arg("config_file_path", config_file_path)
    }

    pub fn delete_vm(disk_path: &str) -> OperationRequest {
        req("delete_vm").arg("disk_path", disk_path)
    }

    pub fn list_running_vms() -> OperationRequest {
        req("list_running_vms")
    }

    pub fn stop_vm(pid: u32) -> OperationRequest {
        req("stop_vm").arg("pid", pid)
    }

    /// `size` uses qemu-img notation, e.g. `20G`.
    pub fn create_disk_image(path: &str, size: &str) -> OperationRequest {
        req("create_disk_image").arg("path", path).arg("size", size)
    }
}
