use kube::CustomResourceExt;
use psmdb_k8s::crd::PerconaServerMongoDB;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&PerconaServerMongoDB::crd())?);
    Ok(())
}
