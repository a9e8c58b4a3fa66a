use std::time::Duration;

#[tokio::main]
pub async fn main(){
    let central = shellyread::BluestCentral::new().await.unwrap();
    let address = "A0:DD:6C:4B:9C:36".parse().unwrap();
    let client = shellyread::RpcClient::new(central, address);
    loop {
        let status = client.get_status(Duration::from_secs(5)).await.unwrap();
        println!("{status:?}");
        tokio::time::sleep(Duration::from_secs(30)).await;
    }
}
