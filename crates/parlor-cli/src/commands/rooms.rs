//! Room listing and creation.

use anyhow::Result;

use parlor_client::ChatClient;

use crate::context::Context;
use crate::output::print_success;

pub async fn list(context: &Context) -> Result<()> {
    let chat = ChatClient::new(&context.config, context.session.clone())?;
    let rooms = chat.get_rooms().await;

    if rooms.is_empty() {
        println!("No rooms.");
        return Ok(());
    }
    for room in rooms {
        println!("  {:<10} {}", room.id, room.name);
    }
    Ok(())
}

pub async fn create(context: &Context, name: Option<&str>) -> Result<()> {
    let chat = ChatClient::new(&context.config, context.session.clone())?;
    let room = chat.create_room(name).await?;
    print_success(&format!("Created room {} (id: {})", room.name, room.id));
    Ok(())
}
