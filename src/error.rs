use thiserror::Error;

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error(transparent)]
    Kube(#[from] kube::Error),

    #[error("kubeconfig discovery failed")]
    ConfigDiscovery,
}
