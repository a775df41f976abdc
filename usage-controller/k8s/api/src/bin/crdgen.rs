use btp_usage_controller_k8s_api::ResourceUsage;
use kube::core::CustomResourceExt;

fn main() -> Result<(), serde_yaml::Error> {
    let crd = serde_yaml::to_string(&ResourceUsage::crd())?;
    print!("{crd}");
    Ok(())
}
